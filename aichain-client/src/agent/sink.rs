use std::fmt;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub ok: bool,
    pub text: String,
}

impl StatusLine {
    pub fn new(ok: bool, text: impl Into<String>) -> Self {
        Self {
            ok,
            text: text.into(),
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub fn status_channel() -> (StatusSender, StatusReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusSender { tx }, StatusReceiver { rx })
}

#[derive(Clone)]
pub struct StatusSender {
    tx: UnboundedSender<StatusLine>,
}

impl StatusSender {
    /// Never blocks. Lines pushed after the receiver is gone are discarded.
    pub fn push(&self, line: StatusLine) {
        if let Err(e) = self.tx.send(line) {
            debug!("Status receiver closed, dropping line: {}", e.0);
        }
    }
}

pub struct StatusReceiver {
    rx: UnboundedReceiver<StatusLine>,
}

impl StatusReceiver {
    /// Everything queued right now, oldest first.
    pub fn drain_available(&mut self) -> Vec<StatusLine> {
        let mut lines = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(line) => lines.push(line),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        lines
    }

    pub async fn recv(&mut self) -> Option<StatusLine> {
        self.rx.recv().await
    }
}
