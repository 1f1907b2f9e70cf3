use serde::{Deserialize, Serialize};

use crate::device::GpuDevice;

/// Body of `POST /heartbeat`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRequest {
    pub wallet: String,
    pub gpu_count: usize,
}

impl HeartbeatRequest {
    pub fn new(wallet: &str, devices: &[GpuDevice]) -> Self {
        Self {
            wallet: wallet.to_string(),
            gpu_count: devices.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let devices = vec![GpuDevice {
            name: "RTX 4090".to_string(),
            memory_total_mb: 24564,
            memory_free_mb: 24000,
            utilization: 0.1,
        }];
        let req = HeartbeatRequest::new("wallet1", &devices);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"wallet": "wallet1", "gpu_count": 1}));
    }

    #[test]
    fn test_request_without_devices() {
        let req = HeartbeatRequest::new("w", &[]);
        assert_eq!(req.gpu_count, 0);
    }
}
