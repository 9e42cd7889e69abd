use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Cpu,
    Wgpu,
    Cuda,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Cpu, Backend::Wgpu, Backend::Cuda];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cpu" => Some(Backend::Cpu),
            "wgpu" | "gpu" => Some(Backend::Wgpu),
            "cuda" => Some(Backend::Cuda),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Cpu => "CPU",
            Backend::Wgpu => "wgpu",
            Backend::Cuda => "CUDA",
        };
        f.write_str(name)
    }
}

/// Dimensions of the reference matrix: `rows` points of `dims` floats each.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub dims: usize,
}

impl Shape {
    pub const fn new(rows: usize, dims: usize) -> Self {
        Self { rows, dims }
    }

    /// Element count of the matrix, `None` on overflow.
    pub fn elements(&self) -> Option<usize> {
        self.rows.checked_mul(self.dims)
    }

    /// Size of the matrix in bytes as `f32`, `None` on overflow.
    pub fn matrix_bytes(&self) -> Option<usize> {
        self.elements()?.checked_mul(std::mem::size_of::<f32>())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub backend: Backend,
    /// Backend-specific description (adapter type, driver, thread count, ...).
    pub detail: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{} [{}]", self.name, self.backend)
        } else {
            write!(f, "{} [{}: {}]", self.name, self.backend, self.detail)
        }
    }
}

/// Where in the per-device pipeline a failure happened.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Bind,
    Transfer,
    Compile,
    Launch,
    Synchronize,
    Readback,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Bind => "bind",
            Stage::Transfer => "transfer",
            Stage::Compile => "compile",
            Stage::Launch => "launch",
            Stage::Synchronize => "synchronize",
            Stage::Readback => "readback",
            Stage::Verify => "verify",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Timings {
    /// Matrix allocation plus synchronous host-to-device copy.
    pub load_ms: f64,
    /// Kernel launch issue only.
    pub dispatch_ms: f64,
    /// Launch issue through synchronize and output readback.
    pub run_ms: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Check {
    pub sampled: usize,
    pub max_rel_err: f64,
    pub passed: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed {
        timings: Timings,
        output_len: usize,
        last_value: Option<f32>,
        check: Option<Check>,
    },
    Failed {
        stage: Stage,
        message: String,
    },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeviceReport {
    pub device: DeviceInfo,
    pub outcome: Outcome,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunReport {
    pub shape: Shape,
    pub seed: Option<u64>,
    pub devices: Vec<DeviceReport>,
}

impl RunReport {
    pub fn all_completed(&self) -> bool {
        self.devices.iter().all(|d| d.outcome.is_completed())
    }
}
