use gpuload_types::{Backend, DeviceInfo};
use tracing::{info, info_span, warn};

use crate::{Error, Matrix};

mod cpu;
#[cfg(feature = "cuda")]
mod cuda;
mod gpu;

pub use cpu::CpuAccelerator;
#[cfg(feature = "cuda")]
pub use cuda::CudaAccelerator;
pub use gpu::WgpuAccelerator;

/// A discovered compute device. Binding it opens an execution context whose
/// buffers live as long as the returned session.
pub trait Accelerator {
    fn info(&self) -> &DeviceInfo;

    fn bind(&self) -> Result<Box<dyn Session + '_>, Error>;
}

/// Device-side state for one benchmark iteration. Calls are made in
/// declaration order; dropping the session releases every buffer.
pub trait Session {
    /// Allocate matrix storage and copy `matrix` into it. Returns once the
    /// copy has completed on the device.
    fn upload_matrix(&mut self, matrix: &Matrix) -> Result<(), Error>;

    fn upload_query(&mut self, query: &[f32]) -> Result<(), Error>;

    /// Allocate `rows` uninitialised output elements.
    fn allocate_output(&mut self, rows: usize) -> Result<(), Error>;

    fn compile(&mut self) -> Result<(), Error>;

    /// Issue the kernel over every row. May return before the work is done.
    fn launch(&mut self) -> Result<(), Error>;

    /// Block until the launched work has completed.
    fn synchronize(&mut self) -> Result<(), Error>;

    fn read_output(&mut self) -> Result<Vec<f32>, Error>;
}

/// Devices visible to the enabled runtimes, enumerated once.
pub struct Context {
    accelerators: Vec<Box<dyn Accelerator>>,
}

impl Context {
    /// Enumerate `backends` in order. A runtime that fails to enumerate
    /// contributes no devices.
    pub fn create(backends: &[Backend]) -> Self {
        let _span = info_span!("enumerate", ?backends).entered();
        let mut accelerators: Vec<Box<dyn Accelerator>> = Vec::new();

        for backend in backends {
            match enumerate_backend(*backend) {
                Ok(found) => {
                    info!(%backend, count = found.len(), "backend enumerated");
                    accelerators.extend(found);
                }
                Err(e) => warn!(%backend, error = %e, "backend unavailable"),
            }
        }

        Self { accelerators }
    }

    pub fn from_accelerators(accelerators: Vec<Box<dyn Accelerator>>) -> Self {
        Self { accelerators }
    }

    pub fn devices(&self) -> impl Iterator<Item = &dyn Accelerator> + '_ {
        self.accelerators.iter().map(|a| a.as_ref())
    }

    pub fn len(&self) -> usize {
        self.accelerators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accelerators.is_empty()
    }
}

fn enumerate_backend(backend: Backend) -> Result<Vec<Box<dyn Accelerator>>, Error> {
    match backend {
        Backend::Cpu => Ok(vec![Box::new(CpuAccelerator::new()) as Box<dyn Accelerator>]),
        Backend::Wgpu => Ok(gpu::enumerate()
            .into_iter()
            .map(|a| Box::new(a) as Box<dyn Accelerator>)
            .collect()),
        #[cfg(feature = "cuda")]
        Backend::Cuda => Ok(cuda::enumerate()?
            .into_iter()
            .map(|a| Box::new(a) as Box<dyn Accelerator>)
            .collect()),
        #[cfg(not(feature = "cuda"))]
        Backend::Cuda => Err(Error::DeviceInit(
            "built without the `cuda` feature".into(),
        )),
    }
}
