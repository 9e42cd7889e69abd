use std::fmt;

pub use gpuload_types::{
    Backend, Check, DeviceInfo, DeviceReport, Outcome, RunReport, Shape, Stage, Timings,
};

mod bench;
pub mod config;
pub mod dataset;
pub mod device;
pub mod kernel;
mod timing;
mod validation;
pub mod verify;

pub use bench::{measure, run, run_device, Measurement};
pub use config::BenchConfig;
pub use dataset::{Dataset, Matrix};
pub use device::{Accelerator, Context, Session};
pub use validation::validate;

#[derive(Debug)]
pub enum Error {
    InvalidConfig(String),
    DeviceInit(String),
    Allocation(String),
    Transfer(String),
    Compile(String),
    Launch(String),
    Synchronize(String),
    Readback(String),
    /// A session operation was called before the one it depends on.
    Execution(String),
}

impl Error {
    /// Pipeline stage a failure is reported under.
    pub fn stage(&self) -> Stage {
        match self {
            Error::InvalidConfig(_) | Error::DeviceInit(_) => Stage::Bind,
            Error::Allocation(_) | Error::Transfer(_) => Stage::Transfer,
            Error::Compile(_) => Stage::Compile,
            Error::Launch(_) | Error::Execution(_) => Stage::Launch,
            Error::Synchronize(_) => Stage::Synchronize,
            Error::Readback(_) => Stage::Readback,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Error::DeviceInit(msg) => write!(f, "device initialization failed: {msg}"),
            Error::Allocation(msg) => write!(f, "device allocation failed: {msg}"),
            Error::Transfer(msg) => write!(f, "host to device copy failed: {msg}"),
            Error::Compile(msg) => write!(f, "kernel compilation failed: {msg}"),
            Error::Launch(msg) => write!(f, "kernel launch failed: {msg}"),
            Error::Synchronize(msg) => write!(f, "device synchronization failed: {msg}"),
            Error::Readback(msg) => write!(f, "device to host copy failed: {msg}"),
            Error::Execution(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_pipeline_stages() {
        assert_eq!(Error::DeviceInit("x".into()).stage(), Stage::Bind);
        assert_eq!(Error::Allocation("x".into()).stage(), Stage::Transfer);
        assert_eq!(Error::Compile("x".into()).stage(), Stage::Compile);
        assert_eq!(Error::Execution("x".into()).stage(), Stage::Launch);
        assert_eq!(Error::Synchronize("x".into()).stage(), Stage::Synchronize);
        assert_eq!(Error::Readback("x".into()).stage(), Stage::Readback);
    }

    #[test]
    fn display_prefixes_the_failure_kind() {
        let err = Error::Allocation("matrix needs 100000000 bytes".into());
        assert_eq!(
            err.to_string(),
            "device allocation failed: matrix needs 100000000 bytes"
        );
    }
}
