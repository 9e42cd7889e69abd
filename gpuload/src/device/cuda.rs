use cudarc::driver::{CudaDevice, CudaFunction, CudaSlice, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::compile_ptx;
use gpuload_types::{Backend, DeviceInfo};
use std::sync::Arc;
use tracing::{debug, info, info_span};

use super::{Accelerator, Session};
use crate::kernel::{CUDA_EUCLIDEAN_SQUARE, ENTRY_POINT, WORKGROUP_SIZE};
use crate::{Error, Matrix};

const MODULE: &str = "gpuload";

pub(crate) fn enumerate() -> Result<Vec<CudaAccelerator>, Error> {
    let count = CudaDevice::count().map_err(|e| Error::DeviceInit(e.to_string()))?;
    Ok((0..count.max(0) as usize).map(CudaAccelerator::new).collect())
}

pub struct CudaAccelerator {
    ordinal: usize,
    info: DeviceInfo,
}

impl CudaAccelerator {
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            info: DeviceInfo {
                name: format!("CUDA device {}", ordinal),
                backend: Backend::Cuda,
                detail: format!("ordinal {}", ordinal),
            },
        }
    }
}

impl Accelerator for CudaAccelerator {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn bind(&self) -> Result<Box<dyn Session + '_>, Error> {
        let _span = info_span!("cuda_bind", ordinal = self.ordinal).entered();
        let device = CudaDevice::new(self.ordinal).map_err(|e| Error::DeviceInit(e.to_string()))?;
        match device.name() {
            Ok(name) => info!(%name, "CUDA context created"),
            Err(_) => info!("CUDA context created"),
        }

        Ok(Box::new(CudaSession {
            device,
            matrix: None,
            query: None,
            output: None,
            rows: 0,
            dims: 0,
            function: None,
        }))
    }
}

struct CudaSession {
    device: Arc<CudaDevice>,
    matrix: Option<CudaSlice<f32>>,
    query: Option<CudaSlice<f32>>,
    output: Option<CudaSlice<f32>>,
    rows: usize,
    dims: usize,
    function: Option<CudaFunction>,
}

impl Session for CudaSession {
    fn upload_matrix(&mut self, matrix: &Matrix) -> Result<(), Error> {
        self.rows = matrix.rows();
        self.dims = matrix.dims();
        // Zero-byte device allocations are rejected by the driver.
        if matrix.as_slice().is_empty() {
            self.matrix = None;
            return Ok(());
        }
        let slice = self
            .device
            .htod_sync_copy(matrix.as_slice())
            .map_err(|e| Error::Transfer(e.to_string()))?;
        debug!(elements = slice.len(), "cuda_upload_matrix");
        self.matrix = Some(slice);
        Ok(())
    }

    fn upload_query(&mut self, query: &[f32]) -> Result<(), Error> {
        if query.is_empty() {
            self.query = None;
            return Ok(());
        }
        let slice = self
            .device
            .htod_sync_copy(query)
            .map_err(|e| Error::Transfer(e.to_string()))?;
        self.query = Some(slice);
        Ok(())
    }

    fn allocate_output(&mut self, rows: usize) -> Result<(), Error> {
        if rows == 0 {
            self.output = None;
            return Ok(());
        }
        // SAFETY: every element is written by the kernel before readback.
        let slice = unsafe { self.device.alloc::<f32>(rows) }
            .map_err(|e| Error::Allocation(e.to_string()))?;
        self.output = Some(slice);
        Ok(())
    }

    fn compile(&mut self) -> Result<(), Error> {
        let ptx = compile_ptx(CUDA_EUCLIDEAN_SQUARE).map_err(|e| Error::Compile(e.to_string()))?;
        self.device
            .load_ptx(ptx, MODULE, &[ENTRY_POINT])
            .map_err(|e| Error::Compile(e.to_string()))?;
        let function = self
            .device
            .get_func(MODULE, ENTRY_POINT)
            .ok_or_else(|| Error::Compile(format!("{} missing from module", ENTRY_POINT)))?;
        info!("CUDA kernel compiled");
        self.function = Some(function);
        Ok(())
    }

    fn launch(&mut self) -> Result<(), Error> {
        let function = self
            .function
            .clone()
            .ok_or_else(|| Error::Execution("kernel launched before compile".into()))?;
        if self.rows == 0 {
            return Ok(());
        }
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| Error::Execution("output not allocated".into()))?;
        let (Some(matrix), Some(query)) = (&self.matrix, &self.query) else {
            // dims == 0: every distance is zero
            let zeros = vec![0.0f32; self.rows];
            return self
                .device
                .htod_sync_copy_into(&zeros, output)
                .map_err(|e| Error::Launch(e.to_string()));
        };

        let cfg = LaunchConfig {
            grid_dim: ((self.rows as u32).div_ceil(WORKGROUP_SIZE), 1, 1),
            block_dim: (WORKGROUP_SIZE, 1, 1),
            shared_mem_bytes: 0,
        };
        // SAFETY: argument order and types match the kernel signature; the
        // grid covers `rows` threads and the kernel bounds-checks the rest.
        unsafe {
            function.launch(cfg, (matrix, query, output, self.rows as u32, self.dims as u32))
        }
        .map_err(|e| Error::Launch(e.to_string()))?;
        debug!(rows = self.rows, "cuda_dispatch");
        Ok(())
    }

    fn synchronize(&mut self) -> Result<(), Error> {
        self.device
            .synchronize()
            .map_err(|e| Error::Synchronize(e.to_string()))
    }

    fn read_output(&mut self) -> Result<Vec<f32>, Error> {
        match &self.output {
            Some(output) => self
                .device
                .dtoh_sync_copy(output)
                .map_err(|e| Error::Readback(e.to_string())),
            None => Ok(Vec::new()),
        }
    }
}
