//! Per-frame spiral rendering
//!
//! Every frame the engine clears the framebuffer and scatters the phyllotaxis
//! pattern around each anchor. The pixel work runs on a [`ComputeQueue`]:
//!
//! ```text
//! ┌──────────────┐   FrameJob    ┌──────────────┐  clear  h×w
//! │ RenderEngine │──────────────►│ ComputeQueue │  splat  anchors×N
//! └──────────────┘               └──────────────┘
//!        ▲                              │
//!        │ anchors snapshot             ▼ returns after all writes land
//!   InputRouter                    FrameTarget (shm pixels)
//! ```
//!
//! `submit` is synchronous: when it returns, the frame target holds the
//! complete frame and may be attached to the surface.

pub mod cpu;
#[cfg(feature = "gpu-compute")]
pub mod gpu;
pub mod pattern;
pub mod pixel;

use crate::config::{parse_color, ComputeBackend, RenderConfig};
use crate::error::RenderError;
use crate::input::Anchor;
use log::{info, trace};

pub use cpu::CpuQueue;
pub use pattern::{Pattern, Phyllotaxis, Sample};

/// Mutable view of a framebuffer's pixels
#[derive(Debug)]
pub struct FrameTarget<'a> {
    pixels: &'a mut [u32],
    width: u32,
    height: u32,
}

impl<'a> FrameTarget<'a> {
    pub fn new(pixels: &'a mut [u32], width: u32, height: u32) -> Result<Self, RenderError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(RenderError::TargetMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &*self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut *self.pixels
    }
}

/// Everything a queue needs to paint one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameJob<'a> {
    pub anchors: &'a [Anchor],
    pub samples: &'a [Sample],
    /// Clear colour, already adjusted for the pixel format
    pub background: u32,
    /// Spiral colour at full brightness, already adjusted for the pixel format
    pub foreground: u32,
}

/// A parallel execution context for the clear and splat kernels
pub trait ComputeQueue {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Run both kernels for one frame and wait for them to finish
    fn submit(&mut self, target: &mut FrameTarget<'_>, job: &FrameJob<'_>) -> Result<(), RenderError>;
}

/// Map a sample position to a pixel index, discarding anything off-frame
#[inline]
pub(crate) fn pixel_coords(anchor: Anchor, sample: &Sample, width: u32, height: u32) -> Option<(u32, u32)> {
    let x = (anchor.x + sample.dx).floor();
    let y = (anchor.y + sample.dy).floor();
    if x < 0.0 || y < 0.0 || x >= f64::from(width) || y >= f64::from(height) {
        return None;
    }
    Some((x as u32, y as u32))
}

/// Paints the spiral pattern around the current anchors
pub struct RenderEngine {
    queue: Box<dyn ComputeQueue>,
    pattern: Phyllotaxis,
    background: u32,
    foreground: u32,
    anchors: Vec<Anchor>,
    frames: u64,
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("queue", &self.queue.name())
            .field("samples", &self.pattern.count())
            .field("background", &format_args!("{:#010x}", self.background))
            .field("foreground", &format_args!("{:#010x}", self.foreground))
            .field("frames", &self.frames)
            .finish()
    }
}

impl RenderEngine {
    /// Build an engine with the queue selected by the configuration
    pub fn new(config: &RenderConfig) -> Result<Self, RenderError> {
        let queue: Box<dyn ComputeQueue> = match config.compute {
            ComputeBackend::Cpu => Box::new(CpuQueue::new(config.workers)),
            #[cfg(feature = "gpu-compute")]
            ComputeBackend::Gpu => Box::new(gpu::GpuQueue::new()?),
            #[cfg(not(feature = "gpu-compute"))]
            ComputeBackend::Gpu => return Err(RenderError::BackendUnavailable("gpu".to_string())),
        };
        Self::with_queue(config, queue)
    }

    /// Build an engine on an explicit queue
    pub fn with_queue(config: &RenderConfig, queue: Box<dyn ComputeQueue>) -> Result<Self, RenderError> {
        let color = |text: &str| {
            parse_color(text)
                .map(|c| pixel::for_format(c, config.pixel_format))
                .map_err(|e| RenderError::InvalidColor(format!("{:#}", e)))
        };
        let background = color(&config.background)?;
        let foreground = color(&config.foreground)?;

        info!(
            "🌻 Render engine: {} queue, {} samples per anchor",
            queue.name(),
            config.samples
        );

        Ok(Self {
            queue,
            pattern: Phyllotaxis::new(config.samples),
            background,
            foreground,
            anchors: Vec::new(),
            frames: 0,
        })
    }

    /// Paint one frame around `anchors` into `target`.
    ///
    /// Returns once every pixel write has landed.
    pub fn render(&mut self, target: &mut FrameTarget<'_>, anchors: &[Anchor]) -> Result<(), RenderError> {
        if anchors.is_empty() {
            return Err(RenderError::NoAnchors);
        }

        self.anchors.clear();
        self.anchors.extend_from_slice(anchors);

        let job = FrameJob {
            anchors: &self.anchors,
            samples: self.pattern.samples(),
            background: self.background,
            foreground: self.foreground,
        };
        self.queue.submit(target, &job)?;

        self.frames += 1;
        trace!(
            "Frame {} rendered {}x{} with {} anchors",
            self.frames,
            target.width(),
            target.height(),
            anchors.len()
        );
        Ok(())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn background(&self) -> u32 {
        self.background
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(samples: u32) -> RenderConfig {
        RenderConfig {
            samples,
            workers: 2,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_target_size_is_checked() {
        let mut pixels = vec![0u32; 10];
        assert!(FrameTarget::new(&mut pixels, 5, 2).is_ok());
        assert!(matches!(
            FrameTarget::new(&mut pixels, 4, 4),
            Err(RenderError::TargetMismatch { expected: 16, actual: 10 })
        ));
    }

    #[test]
    fn test_pixel_coords_bounds() {
        let sample = Sample { dx: 0.0, dy: 0.0, level: 255 };
        assert_eq!(pixel_coords(Anchor::new(0.0, 0.0), &sample, 4, 4), Some((0, 0)));
        assert_eq!(pixel_coords(Anchor::new(3.9, 3.9), &sample, 4, 4), Some((3, 3)));
        assert_eq!(pixel_coords(Anchor::new(4.0, 0.0), &sample, 4, 4), None);
        assert_eq!(pixel_coords(Anchor::new(-0.5, 0.0), &sample, 4, 4), None);
        assert_eq!(pixel_coords(Anchor::new(0.0, -3.0), &sample, 4, 4), None);
    }

    #[test]
    fn test_empty_anchor_list_is_rejected() {
        let mut engine = RenderEngine::new(&small_config(16)).unwrap();
        let mut pixels = vec![0u32; 16];
        let mut target = FrameTarget::new(&mut pixels, 4, 4).unwrap();
        assert!(matches!(engine.render(&mut target, &[]), Err(RenderError::NoAnchors)));
        assert_eq!(engine.frames_rendered(), 0);
    }

    #[test]
    fn test_xrgb_background_has_padding_byte() {
        let engine = RenderEngine::new(&small_config(16)).unwrap();
        assert_eq!(engine.background(), 0xff00_0000);
    }

    #[test]
    fn test_single_sample_lights_anchor_pixel() {
        let mut engine = RenderEngine::new(&small_config(1)).unwrap();
        let mut pixels = vec![0u32; 8 * 8];
        let mut target = FrameTarget::new(&mut pixels, 8, 8).unwrap();

        engine.render(&mut target, &[Anchor::new(2.5, 5.0)]).unwrap();

        let lit: Vec<usize> = target
            .pixels()
            .iter()
            .enumerate()
            .filter(|(_, p)| **p != 0xff00_0000)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(lit, vec![5 * 8 + 2]);
        assert_eq!(target.pixels()[5 * 8 + 2], 0xffff_ffff);
        assert_eq!(engine.frames_rendered(), 1);
    }

    #[cfg(not(feature = "gpu-compute"))]
    #[test]
    fn test_gpu_backend_unavailable_without_feature() {
        let config = RenderConfig {
            compute: ComputeBackend::Gpu,
            ..RenderConfig::default()
        };
        assert!(matches!(
            RenderEngine::new(&config),
            Err(RenderError::BackendUnavailable(_))
        ));
    }
}
