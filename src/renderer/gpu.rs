//! wgpu compute queue
//!
//! Pixels live in a device-side storage buffer while two compute passes run:
//! `clear` over the `h×w` grid, then `splat` over `anchors×N`. A packed `u32`
//! max is not a per-channel max, so `splat` blends with a compare-exchange
//! loop that retries until its channel-wise maximum lands. The result is
//! copied into a staging buffer, mapped after `device.poll(Wait)` and written
//! into the frame target.
//!
//! The splat grid runs samples along `x` and anchors along `y`, folding any
//! anchors past the per-dimension workgroup limit into `z`.

use super::{ComputeQueue, FrameJob, FrameTarget, Sample};
use crate::error::RenderError;
use bytemuck::{Pod, Zeroable};
use log::info;
use std::sync::mpsc;
use wgpu::util::DeviceExt;

const SHADER: &str = r#"
struct Params {
    width: u32,
    height: u32,
    samples: u32,
    anchors: u32,
    background: u32,
    foreground: u32,
    anchor_rows: u32,
    _pad: u32,
}

struct Sample {
    offset: vec2<f32>,
    level: u32,
    _pad: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read_write> pixels: array<atomic<u32>>;
@group(0) @binding(2) var<storage, read> anchors: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read> samples: array<Sample>;

fn scale(color: u32, level: u32) -> u32 {
    var acc = 0u;
    for (var shift = 0u; shift < 32u; shift = shift + 8u) {
        let channel = (color >> shift) & 0xffu;
        acc = acc | ((channel * level / 255u) << shift);
    }
    return acc;
}

fn max_channels(a: u32, b: u32) -> u32 {
    var acc = 0u;
    for (var shift = 0u; shift < 32u; shift = shift + 8u) {
        let mask = 0xffu << shift;
        acc = acc | max(a & mask, b & mask);
    }
    return acc;
}

@compute @workgroup_size(16, 16, 1)
fn clear(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.width || id.y >= params.height) {
        return;
    }
    atomicStore(&pixels[id.y * params.width + id.x], params.background);
}

@compute @workgroup_size(256, 1, 1)
fn splat(@builtin(global_invocation_id) id: vec3<u32>) {
    let n = id.x;
    let a = id.z * params.anchor_rows + id.y;
    if (n >= params.samples || a >= params.anchors) {
        return;
    }
    let s = samples[n];
    let p = floor(anchors[a] + s.offset);
    if (p.x < 0.0 || p.y < 0.0 || p.x >= f32(params.width) || p.y >= f32(params.height)) {
        return;
    }
    let idx = u32(p.y) * params.width + u32(p.x);
    let color = scale(params.foreground, s.level);
    var old = atomicLoad(&pixels[idx]);
    loop {
        let blended = max_channels(old, color);
        if (blended == old) {
            break;
        }
        let result = atomicCompareExchangeWeak(&pixels[idx], old, blended);
        if (result.exchanged) {
            break;
        }
        old = result.old_value;
    }
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuParams {
    width: u32,
    height: u32,
    samples: u32,
    anchors: u32,
    background: u32,
    foreground: u32,
    anchor_rows: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuSample {
    offset: [f32; 2],
    level: u32,
    _pad: u32,
}

/// Device buffers sized for one framebuffer geometry
struct FrameBuffers {
    width: u32,
    height: u32,
    pixels: wgpu::Buffer,
    staging: wgpu::Buffer,
}

/// Compute queue backed by a wgpu device
pub struct GpuQueue {
    device: wgpu::Device,
    queue: wgpu::Queue,
    clear: wgpu::ComputePipeline,
    splat: wgpu::ComputePipeline,
    samples: Option<(usize, wgpu::Buffer)>,
    frame: Option<FrameBuffers>,
}

impl std::fmt::Debug for GpuQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuQueue")
            .field("frame", &self.frame.as_ref().map(|fb| (fb.width, fb.height)))
            .finish()
    }
}

impl GpuQueue {
    /// Pick an adapter and build the compute pipelines
    pub fn new() -> Result<Self, RenderError> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| RenderError::Gpu("no suitable GPU adapter".to_string()))?;

        info!("🖥️ Using GPU: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("phyllo compute device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::Gpu(e.to_string()))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("phyllotaxis kernels"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let clear = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("clear"),
            layout: None,
            module: &module,
            entry_point: "clear",
        });
        let splat = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("splat"),
            layout: None,
            module: &module,
            entry_point: "splat",
        });

        Ok(Self {
            device,
            queue,
            clear,
            splat,
            samples: None,
            frame: None,
        })
    }

    fn ensure_samples(&mut self, samples: &[Sample]) {
        if matches!(self.samples, Some((count, _)) if count == samples.len()) {
            return;
        }
        let table: Vec<GpuSample> = samples
            .iter()
            .map(|s| GpuSample {
                offset: [s.dx as f32, s.dy as f32],
                level: s.level,
                _pad: 0,
            })
            .collect();
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("samples"),
            contents: bytemuck::cast_slice(&table),
            usage: wgpu::BufferUsages::STORAGE,
        });
        self.samples = Some((samples.len(), buffer));
    }

    fn ensure_frame(&mut self, width: u32, height: u32) {
        if matches!(&self.frame, Some(fb) if fb.width == width && fb.height == height) {
            return;
        }
        let size = u64::from(width) * u64::from(height) * 4;
        let pixels = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixels"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixels staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        self.frame = Some(FrameBuffers {
            width,
            height,
            pixels,
            staging,
        });
    }
}

impl ComputeQueue for GpuQueue {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn submit(&mut self, target: &mut FrameTarget<'_>, job: &FrameJob<'_>) -> Result<(), RenderError> {
        let width = target.width();
        let height = target.height();
        if width == 0 || height == 0 || job.samples.is_empty() || job.anchors.is_empty() {
            return Ok(());
        }
        let grid = splat_grid(job.samples.len(), job.anchors.len())?;

        self.ensure_samples(job.samples);
        self.ensure_frame(width, height);
        let (Some((_, samples)), Some(frame)) = (&self.samples, &self.frame) else {
            return Err(RenderError::Gpu("device buffers missing".to_string()));
        };

        let params = GpuParams {
            width,
            height,
            samples: job.samples.len() as u32,
            anchors: job.anchors.len() as u32,
            background: job.background,
            foreground: job.foreground,
            anchor_rows: grid.anchor_rows,
            _pad: 0,
        };
        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let anchors: Vec<[f32; 2]> = job.anchors.iter().map(|a| [a.x as f32, a.y as f32]).collect();
        let anchors = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("anchors"),
            contents: bytemuck::cast_slice(&anchors),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let clear_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("clear bindings"),
            layout: &self.clear.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: frame.pixels.as_entire_binding(),
                },
            ],
        });
        let splat_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("splat bindings"),
            layout: &self.splat.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: frame.pixels.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: anchors.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: samples.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("clear"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.clear);
            pass.set_bind_group(0, &clear_group, &[]);
            pass.dispatch_workgroups(width.div_ceil(16), height.div_ceil(16), 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("splat"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.splat);
            pass.set_bind_group(0, &splat_group, &[]);
            pass.dispatch_workgroups(grid.x, grid.y, grid.z);
        }
        encoder.copy_buffer_to_buffer(&frame.pixels, 0, &frame.staging, 0, frame.staging.size());
        self.queue.submit(Some(encoder.finish()));

        let slice = frame.staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| RenderError::Gpu("staging map callback dropped".to_string()))?
            .map_err(|e| RenderError::Gpu(e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            target
                .pixels_mut()
                .copy_from_slice(bytemuck::cast_slice::<u8, u32>(&data[..]));
        }
        frame.staging.unmap();

        Ok(())
    }
}

/// Default `max_compute_workgroups_per_dimension`
const MAX_GROUPS: u32 = 65535;

/// Invocations per splat workgroup along `x`
const SPLAT_GROUP: u32 = 256;

/// Workgroup counts for the splat pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SplatGrid {
    x: u32,
    y: u32,
    z: u32,
    /// Anchors covered by one `z` slice
    anchor_rows: u32,
}

fn splat_grid(samples: usize, anchors: usize) -> Result<SplatGrid, RenderError> {
    let too_large = || {
        RenderError::Gpu(format!(
            "{} samples × {} anchors exceeds the dispatch limits",
            samples, anchors
        ))
    };

    let samples = u32::try_from(samples).map_err(|_| too_large())?;
    let anchors = u32::try_from(anchors).map_err(|_| too_large())?;

    let x = samples.div_ceil(SPLAT_GROUP);
    let y = anchors.min(MAX_GROUPS);
    let z = anchors.div_ceil(MAX_GROUPS);
    if x > MAX_GROUPS || z > MAX_GROUPS {
        return Err(too_large());
    }

    Ok(SplatGrid {
        x,
        y,
        z,
        anchor_rows: y,
    })
}
