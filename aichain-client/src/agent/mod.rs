pub mod gpu;
mod heartbeat;
pub mod outcome;
pub mod sink;

pub use heartbeat::{AgentError, HeartbeatAgent, LoopState, StartOutcome};
