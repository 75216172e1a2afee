//! Execution context for inference.
//!
//! Device placement is decided once at startup and passed explicitly to every
//! inference call and session construction.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::error::MediaError;

/// Device an inference session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionContext {
    /// CPU execution provider (always available)
    #[default]
    Cpu,
    /// CUDA execution provider on the given device (requires the `cuda` feature)
    Cuda { device_id: i32 },
    /// CoreML execution provider (macOS only)
    CoreMl,
}

impl ExecutionContext {
    /// Returns true for GPU/NPU placements.
    pub fn is_accelerated(&self) -> bool {
        !matches!(self, ExecutionContext::Cpu)
    }

    /// Log the chosen placement.
    pub fn log(&self) {
        info!(device = %self, accelerated = self.is_accelerated(), "Execution context selected");
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Cpu => write!(f, "cpu"),
            ExecutionContext::Cuda { device_id } => write!(f, "cuda:{}", device_id),
            ExecutionContext::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionContext {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "cpu" => return Ok(ExecutionContext::Cpu),
            "cuda" | "gpu" => return Ok(ExecutionContext::Cuda { device_id: 0 }),
            "coreml" => return Ok(ExecutionContext::CoreMl),
            _ => {}
        }

        lower
            .strip_prefix("cuda:")
            .and_then(|id| id.parse::<i32>().ok())
            .filter(|id| *id >= 0)
            .map(|device_id| ExecutionContext::Cuda { device_id })
            .ok_or_else(|| MediaError::internal(format!("Unknown execution device: {}", s)))
    }
}
