pub mod account;
pub mod device;
pub mod heartbeat;
