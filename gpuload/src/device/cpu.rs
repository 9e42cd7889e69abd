use crossbeam_channel::{bounded, Receiver};
use gpuload_types::{Backend, DeviceInfo};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{Accelerator, Session};
use crate::kernel::squared_distance;
use crate::{Error, Matrix};

/// Host accelerator: the kernel runs as a rayon parallel map on a pool
/// owned by the session.
pub struct CpuAccelerator {
    info: DeviceInfo,
    threads: usize,
}

impl CpuAccelerator {
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_threads(threads)
    }

    pub fn with_threads(threads: usize) -> Self {
        let threads = threads.max(1);
        Self {
            info: DeviceInfo {
                name: "CPU".into(),
                backend: Backend::Cpu,
                detail: format!("{} threads", threads),
            },
            threads,
        }
    }
}

impl Default for CpuAccelerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accelerator for CpuAccelerator {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn bind(&self) -> Result<Box<dyn Session + '_>, Error> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("cpu-accel-{}", i))
            .panic_handler(|_| error!("CPU kernel panicked"))
            .build()
            .map_err(|e| Error::DeviceInit(e.to_string()))?;
        info!(threads = self.threads, "CPU accelerator bound");

        Ok(Box::new(CpuSession {
            pool,
            matrix: None,
            query: None,
            output: None,
            compiled: false,
            pending: None,
        }))
    }
}

struct ResidentMatrix {
    dims: usize,
    data: Arc<[f32]>,
}

struct CpuSession {
    pool: ThreadPool,
    matrix: Option<ResidentMatrix>,
    query: Option<Arc<[f32]>>,
    output: Option<Vec<f32>>,
    compiled: bool,
    pending: Option<Receiver<Vec<f32>>>,
}

impl Session for CpuSession {
    fn upload_matrix(&mut self, matrix: &Matrix) -> Result<(), Error> {
        debug!(rows = matrix.rows(), dims = matrix.dims(), "cpu_upload_matrix");
        self.matrix = Some(ResidentMatrix {
            dims: matrix.dims(),
            data: Arc::from(matrix.as_slice()),
        });
        Ok(())
    }

    fn upload_query(&mut self, query: &[f32]) -> Result<(), Error> {
        self.query = Some(Arc::from(query));
        Ok(())
    }

    fn allocate_output(&mut self, rows: usize) -> Result<(), Error> {
        let mut output = Vec::new();
        output
            .try_reserve_exact(rows)
            .map_err(|e| Error::Allocation(format!("{} output rows: {}", rows, e)))?;
        output.resize(rows, 0.0);
        self.output = Some(output);
        Ok(())
    }

    fn compile(&mut self) -> Result<(), Error> {
        // Nothing to build; the kernel is a host function.
        self.compiled = true;
        Ok(())
    }

    fn launch(&mut self) -> Result<(), Error> {
        if !self.compiled {
            return Err(Error::Execution("kernel launched before compile".into()));
        }
        let matrix = self
            .matrix
            .as_ref()
            .ok_or_else(|| Error::Execution("matrix not uploaded".into()))?;
        let query = self
            .query
            .clone()
            .ok_or_else(|| Error::Execution("query not uploaded".into()))?;
        let mut output = self
            .output
            .take()
            .ok_or_else(|| Error::Execution("output not allocated".into()))?;

        let dims = matrix.dims;
        let data = Arc::clone(&matrix.data);
        let (tx, rx) = bounded(1);

        self.pool.spawn(move || {
            if dims == 0 {
                output.fill(0.0);
            } else {
                output
                    .par_iter_mut()
                    .zip(data.par_chunks_exact(dims))
                    .for_each(|(out, row)| *out = squared_distance(&query, row));
            }
            let _ = tx.send(output);
        });

        self.pending = Some(rx);
        Ok(())
    }

    fn synchronize(&mut self) -> Result<(), Error> {
        let Some(rx) = self.pending.take() else {
            return Ok(());
        };
        let output = rx
            .recv()
            .map_err(|_| Error::Synchronize("CPU kernel terminated without a result".into()))?;
        self.output = Some(output);
        Ok(())
    }

    fn read_output(&mut self) -> Result<Vec<f32>, Error> {
        if self.pending.is_some() {
            return Err(Error::Readback("output read before synchronize".into()));
        }
        self.output
            .clone()
            .ok_or_else(|| Error::Readback("output not allocated".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(matrix: &Matrix, query: &[f32]) -> Vec<f32> {
        let acc = CpuAccelerator::with_threads(2);
        let mut session = acc.bind().unwrap();
        session.upload_matrix(matrix).unwrap();
        session.upload_query(query).unwrap();
        session.allocate_output(matrix.rows()).unwrap();
        session.compile().unwrap();
        session.launch().unwrap();
        session.synchronize().unwrap();
        session.read_output().unwrap()
    }

    #[test]
    fn computes_every_row() {
        let m = Matrix::from_rows(&[vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0]]).unwrap();
        assert_eq!(run(&m, &[0.0, 0.0]), vec![0.0, 25.0, 1.0]);
    }

    #[test]
    fn zero_dims_yield_zero_distances() {
        let m = Matrix::from_vec(3, 0, vec![]).unwrap();
        assert_eq!(run(&m, &[]), vec![0.0; 3]);
    }

    #[test]
    fn launch_before_compile_is_rejected() {
        let acc = CpuAccelerator::with_threads(1);
        let mut session = acc.bind().unwrap();
        let m = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        session.upload_matrix(&m).unwrap();
        session.upload_query(&[0.0]).unwrap();
        session.allocate_output(1).unwrap();
        assert!(matches!(session.launch(), Err(Error::Execution(_))));
    }

    #[test]
    fn readback_requires_synchronize() {
        let acc = CpuAccelerator::with_threads(1);
        let mut session = acc.bind().unwrap();
        let m = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        session.upload_matrix(&m).unwrap();
        session.upload_query(&[0.0]).unwrap();
        session.allocate_output(1).unwrap();
        session.compile().unwrap();
        session.launch().unwrap();
        assert!(matches!(session.read_output(), Err(Error::Readback(_))));
        session.synchronize().unwrap();
        assert_eq!(session.read_output().unwrap(), vec![1.0]);
    }

    #[test]
    fn detail_reports_thread_count() {
        assert_eq!(CpuAccelerator::with_threads(0).info().detail, "1 threads");
        assert_eq!(CpuAccelerator::with_threads(8).info().detail, "8 threads");
    }
}
