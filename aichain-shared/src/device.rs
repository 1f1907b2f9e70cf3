use serde::{Deserialize, Serialize};

/// One accelerator as seen on a single sampling tick.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GpuDevice {
    pub name: String,
    pub memory_total_mb: u64,
    pub memory_free_mb: u64,
    /// Load in `[0, 1]`.
    pub utilization: f32,
}

impl GpuDevice {
    pub fn memory_used_mb(&self) -> u64 {
        self.memory_total_mb.saturating_sub(self.memory_free_mb)
    }
}
