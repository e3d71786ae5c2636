//! Cached accelerator device handle (§10.1).
//!
//! One `DeviceContext` is created per process and shared by every kernel
//! launch; creating a fresh device per bag would exhaust OS GPU-driver
//! handles the way a fresh `GpuUnit` per batch would.

use crate::error::Error;
use tracing::{debug, info_span};
use wgpu::{
    Backends, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BufferBindingType, BufferDescriptor,
    BufferUsages, CommandEncoderDescriptor, ComputePassDescriptor, ComputePipelineDescriptor,
    DeviceDescriptor, InstanceDescriptor, MapMode, PipelineCompilationOptions,
    PipelineLayoutDescriptor, PowerPreference, RequestAdapterOptions, ShaderModuleDescriptor,
    ShaderSource, ShaderStages,
};

/// WGSL has no 64-bit atomics and no `f64`, so the core array/tree tables
/// (§4.1) are kept host-side as `AtomicU64` buffers (see [`crate::table`]).
/// `DeviceContext` exists for bulk `u32`-granularity work a host can choose
/// to offload instead, such as a nonzero-count pass over a table snapshot;
/// the driver's own density heuristic (§10.6) computes this on the host by
/// default since the tables it reads are already resident there, but
/// `count_nonzero` is available to a caller that maintains a device-side
/// mirror of a table and wants the count without reading it back first.
pub struct DeviceContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

const COUNT_NONZERO_SHADER: &str = r#"
@group(0) @binding(0)
var<storage, read> words: array<u32>;

@group(0) @binding(1)
var<storage, read_write> partial_counts: array<atomic<u32>>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i < arrayLength(&words)) {
        if (words[i] != 0u) {
            atomicAdd(&partial_counts[0], 1u);
        }
    }
}
"#;

impl DeviceContext {
    pub fn new(backends: Backends) -> Result<Self, Error> {
        let _span = info_span!("device_context_new").entered();
        let instance = wgpu::Instance::new(InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            ..Default::default()
        }))
        .ok_or(Error::NoAdapter)?;

        let (device, queue) =
            pollster::block_on(adapter.request_device(&DeviceDescriptor::default(), None))?;

        debug!("accelerator device acquired");
        Ok(Self { device, queue })
    }

    /// Counts the nonzero 32-bit words among `words`, used to estimate a
    /// bag's table density without downloading the whole table to the host.
    pub fn count_nonzero(&self, words: &[u32]) -> Result<u32, Error> {
        let _span = info_span!("count_nonzero_dispatch", words = words.len()).entered();
        if words.is_empty() {
            return Ok(0);
        }

        let input = self.device.create_buffer(&BufferDescriptor {
            label: Some("density-input"),
            size: (words.len() * std::mem::size_of::<u32>()) as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&input, 0, as_bytes(words));

        let counter = self.device.create_buffer(&BufferDescriptor {
            label: Some("density-counter"),
            size: std::mem::size_of::<u32>() as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&counter, 0, &0u32.to_le_bytes());

        let readback = self.device.create_buffer(&BufferDescriptor {
            label: Some("density-readback"),
            size: std::mem::size_of::<u32>() as u64,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let shader = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("count-nonzero"),
            source: ShaderSource::Wgsl(COUNT_NONZERO_SHADER.into()),
        });

        let bind_group_layout = self.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("density-bind-group-layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = self.device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("density-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("density-pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
            compilation_options: PipelineCompilationOptions::default(),
        });

        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("density-bind-group"),
            layout: &bind_group_layout,
            entries: &[
                BindGroupEntry { binding: 0, resource: input.as_entire_binding() },
                BindGroupEntry { binding: 1, resource: counter.as_entire_binding() },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("density-encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("density-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let workgroups = (words.len() as u32 + 63) / 64;
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&counter, 0, &readback, 0, std::mem::size_of::<u32>() as u64);
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| Error::DeviceFault(e.to_string()))?
            .map_err(|e| Error::DeviceFault(format!("{e:?}")))?;

        let data = slice.get_mapped_range();
        let count = u32::from_le_bytes(data[0..4].try_into().unwrap());
        drop(data);
        readback.unmap();

        Ok(count)
    }
}

fn as_bytes(words: &[u32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(words.as_ptr() as *const u8, std::mem::size_of_val(words))
    }
}
