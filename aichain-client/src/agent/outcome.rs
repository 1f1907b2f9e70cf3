use std::time::Duration;

use crate::server::{RawResponse, ResponseBody, TransportError};

/// Statuses the service uses to reject a heartbeat outright.
pub const APPLICATION_ERROR_STATUSES: [u16; 4] = [400, 401, 403, 500];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    ApplicationError,
    OtherStatus,
}

impl OutcomeKind {
    pub fn for_status(status: u16) -> Self {
        if status == 200 {
            OutcomeKind::Success
        } else if APPLICATION_ERROR_STATUSES.contains(&status) {
            OutcomeKind::ApplicationError
        } else {
            OutcomeKind::OtherStatus
        }
    }
}

/// Result of exactly one heartbeat tick.
#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatOutcome {
    Success { status: u16, body: ResponseBody },
    ApplicationError { status: u16, body: ResponseBody },
    OtherStatus { status: u16, body: ResponseBody },
    Timeout { timeout: Duration, elapsed: Duration },
    TransportFailure(String),
}

impl HeartbeatOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, HeartbeatOutcome::Success { .. })
    }

    /// Message without timestamp. The GPU summary only appears on success.
    pub fn render(&self, gpu_desc: &str) -> String {
        match self {
            HeartbeatOutcome::Success { status, body } => {
                format!("OK {status}: {body} GPUs: {gpu_desc}")
            }
            HeartbeatOutcome::ApplicationError { status, body } => {
                format!("Error {status}: {body}")
            }
            HeartbeatOutcome::OtherStatus { status, body } => format!("Status {status}: {body}"),
            HeartbeatOutcome::Timeout { timeout, .. } => {
                format!("Timeout after {}s", timeout.as_secs_f64())
            }
            HeartbeatOutcome::TransportFailure(description) => format!("Failure: {description}"),
        }
    }
}

pub fn classify(
    result: Result<RawResponse, TransportError>,
    timeout: Duration,
) -> HeartbeatOutcome {
    match result {
        Ok(RawResponse { status, body, .. }) => match OutcomeKind::for_status(status) {
            OutcomeKind::Success => HeartbeatOutcome::Success { status, body },
            OutcomeKind::ApplicationError => HeartbeatOutcome::ApplicationError { status, body },
            OutcomeKind::OtherStatus => HeartbeatOutcome::OtherStatus { status, body },
        },
        Err(TransportError::Timeout { elapsed }) => HeartbeatOutcome::Timeout { timeout, elapsed },
        Err(TransportError::Failure(description)) => {
            HeartbeatOutcome::TransportFailure(description)
        }
    }
}
