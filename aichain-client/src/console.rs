use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::time::interval;
use tracing::{info, warn};

use crate::agent::sink::StatusReceiver;
use crate::agent::{HeartbeatAgent, StartOutcome};
use crate::auth::StoredCredentials;
use crate::util::format::format_status_line;

/// Redraw cadence of the foreground poll.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const HELP: &str = "Commands: start, stop, status, quit";

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Status,
    Quit,
    Help,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(input: &str) -> Option<Self> {
        let cmd = input.trim().to_ascii_lowercase();
        let parsed = match cmd.as_str() {
            "" => return None,
            "start" => ConsoleCommand::Start,
            "stop" => ConsoleCommand::Stop,
            "status" => ConsoleCommand::Status,
            "quit" | "exit" | "q" => ConsoleCommand::Quit,
            "help" | "?" => ConsoleCommand::Help,
            _ => ConsoleCommand::Unknown(cmd),
        };
        Some(parsed)
    }
}

/// Writes every queued status line. Returns how many were written.
pub fn print_available(
    rx: &mut StatusReceiver,
    out: &mut impl Write,
    ansi: bool,
) -> io::Result<usize> {
    let lines = rx.drain_available();
    for line in &lines {
        writeln!(out, "{}", format_status_line(line, ansi))?;
    }
    out.flush()?;
    Ok(lines.len())
}

async fn start_agent(agent: &HeartbeatAgent, credentials: &StoredCredentials) {
    match agent.start(credentials.key(), &credentials.wallet).await {
        Ok(StartOutcome::Started) => eprintln!("Heartbeat started"),
        Ok(StartOutcome::AlreadyRunning) => eprintln!("Heartbeat already running"),
        Err(e) => eprintln!("Error: {e}"),
    }
}

/// Starts the loop and renders status lines until Ctrl-C.
pub async fn run_headless(
    agent: &HeartbeatAgent,
    mut rx: StatusReceiver,
    credentials: &StoredCredentials,
) -> Result<()> {
    agent.start(credentials.key(), &credentials.wallet).await?;

    let ansi = io::stdout().is_terminal();
    let mut ticker = interval(POLL_INTERVAL);
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal, stopping heartbeat");
                break;
            }
            _ = ticker.tick() => {
                print_available(&mut rx, &mut io::stdout(), ansi)?;
            }
        }
    }

    agent.shutdown().await;
    print_available(&mut rx, &mut io::stdout(), ansi)?;
    Ok(())
}

/// Line-driven start/stop control on stdin.
pub async fn run_interactive(
    agent: &HeartbeatAgent,
    mut rx: StatusReceiver,
    credentials: &StoredCredentials,
) -> Result<()> {
    let ansi = io::stdout().is_terminal();
    let mut ticker = interval(POLL_INTERVAL);
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    eprintln!("{HELP}");
    start_agent(agent, credentials).await;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                print_available(&mut rx, &mut io::stdout(), ansi)?;
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    // stdin closed
                    break;
                };
                match ConsoleCommand::parse(&line) {
                    None => {}
                    Some(ConsoleCommand::Start) => start_agent(agent, credentials).await,
                    Some(ConsoleCommand::Stop) => agent.stop().await,
                    Some(ConsoleCommand::Status) => {
                        eprintln!("Heartbeat {:?}", agent.state().await)
                    }
                    Some(ConsoleCommand::Quit) => break,
                    Some(ConsoleCommand::Help) => eprintln!("{HELP}"),
                    Some(ConsoleCommand::Unknown(cmd)) => {
                        warn!("Unknown console command: {}", cmd);
                        eprintln!("Unknown command '{cmd}'. {HELP}");
                    }
                }
            }
        }
    }

    agent.shutdown().await;
    print_available(&mut rx, &mut io::stdout(), ansi)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::sink::{StatusLine, status_channel};

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse(" START \n"), Some(ConsoleCommand::Start));
        assert_eq!(ConsoleCommand::parse("stop"), Some(ConsoleCommand::Stop));
        assert_eq!(ConsoleCommand::parse("q"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("?"), Some(ConsoleCommand::Help));
        assert_eq!(ConsoleCommand::parse("   "), None);
        assert_eq!(
            ConsoleCommand::parse("reboot"),
            Some(ConsoleCommand::Unknown("reboot".to_string()))
        );
    }

    #[test]
    fn test_print_available_writes_in_order() {
        let (tx, mut rx) = status_channel();
        tx.push(StatusLine::new(true, "first"));
        tx.push(StatusLine::new(false, "second"));

        let mut out = Vec::new();
        let written = print_available(&mut rx, &mut out, false).unwrap();

        assert_eq!(written, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "✓ first\n✗ second\n");
        assert_eq!(print_available(&mut rx, &mut Vec::<u8>::new(), false).unwrap(), 0);
    }
}
