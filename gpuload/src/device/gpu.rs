use crossbeam_channel::bounded;
use gpuload_types::{Backend, DeviceInfo};
use pollster::block_on;
use tracing::{debug, info, info_span, warn};
use wgpu::util::{BufferInitDescriptor, DeviceExt};
use wgpu::{
    Backends, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, BufferBindingType, BufferDescriptor, BufferUsages,
    CommandEncoderDescriptor, ComputePassDescriptor, ComputePipelineDescriptor, DeviceDescriptor,
    ErrorFilter, InstanceDescriptor, Maintain, MapMode, PipelineCompilationOptions,
    PipelineLayoutDescriptor, ShaderModuleDescriptor, ShaderSource, ShaderStages,
    SubmissionIndex,
};

use super::{Accelerator, Session};
use crate::kernel::{dispatch_grid, Params, ENTRY_POINT, WGSL_EUCLIDEAN_SQUARE, WORKGROUP_SIZE};
use crate::{Error, Matrix};

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Every adapter wgpu can see across all native backends.
pub(crate) fn enumerate() -> Vec<WgpuAccelerator> {
    let instance = wgpu::Instance::new(InstanceDescriptor {
        backends: Backends::all(),
        ..Default::default()
    });

    instance
        .enumerate_adapters(Backends::all())
        .into_iter()
        .map(WgpuAccelerator::new)
        .collect()
}

pub struct WgpuAccelerator {
    adapter: wgpu::Adapter,
    info: DeviceInfo,
}

impl WgpuAccelerator {
    pub fn new(adapter: wgpu::Adapter) -> Self {
        let raw = adapter.get_info();
        let mut detail = format!("{:?}, {:?}", raw.backend, raw.device_type);
        if !raw.driver.is_empty() {
            detail.push_str(&format!(", {}", raw.driver));
            if !raw.driver_info.is_empty() {
                detail.push_str(&format!(" {}", raw.driver_info));
            }
        }
        Self {
            adapter,
            info: DeviceInfo {
                name: raw.name,
                backend: Backend::Wgpu,
                detail,
            },
        }
    }
}

impl Accelerator for WgpuAccelerator {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn bind(&self) -> Result<Box<dyn Session + '_>, Error> {
        let _span = info_span!("wgpu_bind", adapter = %self.info.name).entered();

        // Default limits cap storage bindings at 128 MiB
        let (device, queue) = block_on(self.adapter.request_device(
            &DeviceDescriptor {
                label: Some("gpuload"),
                required_features: wgpu::Features::empty(),
                required_limits: self.adapter.limits(),
            },
            None,
        ))
        .map_err(|e| Error::DeviceInit(e.to_string()))?;
        info!("GPU device created");

        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            warn!(error = %e, "uncaptured wgpu error");
        }));

        Ok(Box::new(WgpuSession {
            device,
            queue,
            matrix: None,
            query: None,
            output: None,
            rows: 0,
            dims: 0,
            kernel: None,
            pending: None,
        }))
    }
}

struct Kernel {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    grid: (u32, u32),
}

struct WgpuSession {
    device: wgpu::Device,
    queue: wgpu::Queue,
    matrix: Option<wgpu::Buffer>,
    query: Option<wgpu::Buffer>,
    output: Option<wgpu::Buffer>,
    rows: usize,
    dims: usize,
    kernel: Option<Kernel>,
    pending: Option<SubmissionIndex>,
}

impl WgpuSession {
    /// Create a buffer inside error scopes so OOM and limit violations come
    /// back as errors instead of reaching the uncaptured handler.
    fn allocate(&self, label: &str, bytes: u64, usage: BufferUsages) -> Result<wgpu::Buffer, Error> {
        let limits = self.device.limits();
        if usage.contains(BufferUsages::STORAGE)
            && bytes > limits.max_storage_buffer_binding_size as u64
        {
            return Err(Error::Allocation(format!(
                "{} needs {} bytes, storage binding limit is {}",
                label, bytes, limits.max_storage_buffer_binding_size
            )));
        }
        if bytes > limits.max_buffer_size {
            return Err(Error::Allocation(format!(
                "{} needs {} bytes, buffer limit is {}",
                label, bytes, limits.max_buffer_size
            )));
        }

        self.device.push_error_scope(ErrorFilter::OutOfMemory);
        self.device.push_error_scope(ErrorFilter::Validation);
        // Zero-sized storage bindings are invalid; keep one element.
        let buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: bytes.max(F32_BYTES),
            usage,
            mapped_at_creation: false,
        });
        let validation = block_on(self.device.pop_error_scope());
        let oom = block_on(self.device.pop_error_scope());
        if let Some(e) = oom.or(validation) {
            return Err(Error::Allocation(format!("{}: {}", label, e)));
        }
        debug!(label, bytes, "gpu_buffer_allocated");
        Ok(buffer)
    }

    /// Write `data` and wait until the queue has executed the copy.
    fn write_sync(&self, buffer: &wgpu::Buffer, data: &[f32]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        self.device.push_error_scope(ErrorFilter::Validation);
        self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(data));
        let index = self.queue.submit(std::iter::empty());
        self.device.poll(Maintain::WaitForSubmissionIndex(index));
        match block_on(self.device.pop_error_scope()) {
            Some(e) => Err(Error::Transfer(e.to_string())),
            None => Ok(()),
        }
    }
}

impl Session for WgpuSession {
    fn upload_matrix(&mut self, matrix: &Matrix) -> Result<(), Error> {
        let bytes = matrix.as_slice().len() as u64 * F32_BYTES;
        let buffer = self.allocate("matrix", bytes, BufferUsages::STORAGE | BufferUsages::COPY_DST)?;
        self.write_sync(&buffer, matrix.as_slice())?;
        self.rows = matrix.rows();
        self.dims = matrix.dims();
        self.matrix = Some(buffer);
        Ok(())
    }

    fn upload_query(&mut self, query: &[f32]) -> Result<(), Error> {
        let bytes = query.len() as u64 * F32_BYTES;
        let buffer = self.allocate("query", bytes, BufferUsages::STORAGE | BufferUsages::COPY_DST)?;
        self.write_sync(&buffer, query)?;
        self.query = Some(buffer);
        Ok(())
    }

    fn allocate_output(&mut self, rows: usize) -> Result<(), Error> {
        let bytes = rows as u64 * F32_BYTES;
        let buffer = self.allocate("output", bytes, BufferUsages::STORAGE | BufferUsages::COPY_SRC)?;
        self.output = Some(buffer);
        Ok(())
    }

    fn compile(&mut self) -> Result<(), Error> {
        let (Some(matrix), Some(query), Some(output)) = (&self.matrix, &self.query, &self.output)
        else {
            return Err(Error::Execution("buffers must be allocated before compile".into()));
        };
        let _span = info_span!("wgpu_compile").entered();

        let max_groups = self.device.limits().max_compute_workgroups_per_dimension;
        let grid = dispatch_grid(self.rows as u32, max_groups);
        let params = Params {
            rows: self.rows as u32,
            dims: self.dims as u32,
            stride: grid.0 * WORKGROUP_SIZE,
            _pad: 0,
        };

        self.device.push_error_scope(ErrorFilter::Validation);

        let shader = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("euclidean_square"),
            source: ShaderSource::Wgsl(WGSL_EUCLIDEAN_SQUARE.into()),
        });

        let params_buffer = self.device.create_buffer_init(&BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::bytes_of(&params),
            usage: BufferUsages::UNIFORM,
        });

        let storage = |binding: u32, read_only: bool| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = self.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("euclidean_square layout"),
            entries: &[
                storage(0, true),
                storage(1, true),
                storage(2, false),
                BindGroupLayoutEntry {
                    binding: 3,
                    visibility: ShaderStages::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = self.device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("euclidean_square pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("euclidean_square"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: ENTRY_POINT,
            compilation_options: PipelineCompilationOptions::default(),
        });

        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("euclidean_square bind group"),
            layout: &bind_group_layout,
            entries: &[
                BindGroupEntry { binding: 0, resource: matrix.as_entire_binding() },
                BindGroupEntry { binding: 1, resource: query.as_entire_binding() },
                BindGroupEntry { binding: 2, resource: output.as_entire_binding() },
                BindGroupEntry { binding: 3, resource: params_buffer.as_entire_binding() },
            ],
        });

        if let Some(e) = block_on(self.device.pop_error_scope()) {
            return Err(Error::Compile(e.to_string()));
        }
        info!(workgroups_x = grid.0, workgroups_y = grid.1, "GPU pipeline created");

        self.kernel = Some(Kernel {
            pipeline,
            bind_group,
            grid,
        });
        Ok(())
    }

    fn launch(&mut self) -> Result<(), Error> {
        let kernel = self
            .kernel
            .as_ref()
            .ok_or_else(|| Error::Execution("kernel launched before compile".into()))?;

        self.device.push_error_scope(ErrorFilter::Validation);
        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("euclidean_square encoder"),
        });
        if self.rows > 0 {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("euclidean_square pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &kernel.bind_group, &[]);
            pass.dispatch_workgroups(kernel.grid.0, kernel.grid.1, 1);
        }
        let index = self.queue.submit(Some(encoder.finish()));
        if let Some(e) = block_on(self.device.pop_error_scope()) {
            return Err(Error::Launch(e.to_string()));
        }
        debug!(rows = self.rows, "gpu_dispatch");

        self.pending = Some(index);
        Ok(())
    }

    fn synchronize(&mut self) -> Result<(), Error> {
        if let Some(index) = self.pending.take() {
            self.device.poll(Maintain::WaitForSubmissionIndex(index));
        }
        Ok(())
    }

    fn read_output(&mut self) -> Result<Vec<f32>, Error> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| Error::Readback("output not allocated".into()))?;
        if self.rows == 0 {
            return Ok(Vec::new());
        }
        let bytes = self.rows as u64 * F32_BYTES;

        let staging = self.allocate("staging", bytes, BufferUsages::COPY_DST | BufferUsages::MAP_READ)?;
        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        encoder.copy_buffer_to_buffer(output, 0, &staging, 0, bytes);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..bytes);
        let (tx, rx) = bounded(1);
        slice.map_async(MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(Maintain::Wait);

        rx.recv()
            .map_err(|_| Error::Readback("map callback dropped".into()))?
            .map_err(|e| Error::Readback(e.to_string()))?;

        let result = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, f32>(&view).to_vec()
        };
        staging.unmap();
        debug!(rows = result.len(), "gpu_readback_complete");
        Ok(result)
    }
}
