use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use aichain_shared::device::GpuDevice;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("no GPU query tool available")]
    Unavailable,
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} did not finish within {after:?}")]
    TimedOut { tool: &'static str, after: Duration },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Source of accelerator inventory.
pub trait GpuProbe: Send + Sync {
    fn query(&self) -> Result<Vec<GpuDevice>, SamplerError>;
}

/// Samples the probe; failures degrade to an empty inventory.
pub fn sample(probe: &dyn GpuProbe) -> Vec<GpuDevice> {
    match probe.query() {
        Ok(devices) => devices,
        Err(e) => {
            debug!("GPU sampling unavailable: {}", e);
            Vec::new()
        }
    }
}

/// `"<name> <total>MB"` per device, or `"no GPU"`.
pub fn describe_gpus(devices: &[GpuDevice]) -> String {
    if devices.is_empty() {
        return "no GPU".to_string();
    }
    devices
        .iter()
        .map(|g| format!("{} {}MB", g.name, g.memory_total_mb))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------
// nvidia-smi
// ---------------------------------------------------------

const NVIDIA_SMI: &str = "nvidia-smi";

/// Upper bound for a single `nvidia-smi` invocation.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

static HAS_NVIDIA_SMI: OnceLock<bool> = OnceLock::new();

fn has_nvidia_smi(deadline: Duration) -> bool {
    *HAS_NVIDIA_SMI.get_or_init(|| {
        run_with_deadline(NVIDIA_SMI, &["--help"], deadline)
            .map(|out| out.status.success())
            .unwrap_or(false)
    })
}

struct ToolOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Runs `tool` to completion, killing and reaping it once `deadline` passes.
fn run_with_deadline(
    tool: &'static str,
    args: &[&str],
    deadline: Duration,
) -> Result<ToolOutput, SamplerError> {
    let mut child = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SamplerError::Spawn { tool, source })?;

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let mut stdout = String::new();
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stdout.take() {
                    let _ = pipe.read_to_string(&mut stdout);
                }
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                return Ok(ToolOutput {
                    status,
                    stdout,
                    stderr,
                });
            }
            Ok(None) => {
                if start.elapsed() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SamplerError::TimedOut {
                        tool,
                        after: deadline,
                    });
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(source) => return Err(SamplerError::Spawn { tool, source }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NvidiaSmiProbe {
    timeout: Duration,
}

impl NvidiaSmiProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

impl GpuProbe for NvidiaSmiProbe {
    fn query(&self) -> Result<Vec<GpuDevice>, SamplerError> {
        if !has_nvidia_smi(self.timeout) {
            return Err(SamplerError::Unavailable);
        }

        let out = run_with_deadline(
            NVIDIA_SMI,
            &[
                "--query-gpu=name,memory.total,memory.free,utilization.gpu",
                "--format=csv,noheader,nounits",
            ],
            self.timeout,
        )?;

        if !out.status.success() {
            return Err(SamplerError::Failed {
                tool: NVIDIA_SMI,
                status: out.status,
                stderr: out.stderr.trim().to_string(),
            });
        }

        Ok(parse_nvidia_smi_csv(&out.stdout))
    }
}

/// Parses `name, memory.total, memory.free, utilization.gpu` rows.
/// Fields reported as `[N/A]` read as zero.
pub fn parse_nvidia_smi_csv(output: &str) -> Vec<GpuDevice> {
    let mut gpus = Vec::new();

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let parts: Vec<_> = line.split(',').map(|x| x.trim()).collect();
        if parts.len() < 4 {
            continue;
        }

        let utilization_percent = parts[3].parse::<f32>().unwrap_or(0.0);
        gpus.push(GpuDevice {
            name: parts[0].to_string(),
            memory_total_mb: parts[1].parse::<u64>().unwrap_or(0),
            memory_free_mb: parts[2].parse::<u64>().unwrap_or(0),
            utilization: (utilization_percent / 100.0).clamp(0.0, 1.0),
        });
    }

    gpus
}
