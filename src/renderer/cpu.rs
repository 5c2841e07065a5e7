//! Band-parallel CPU compute queue
//!
//! The frame is cut into horizontal bands and each band gets a scoped worker
//! thread. A worker clears its band, then walks every anchor and every sample
//! and keeps only the points that land inside its own rows. Bands never
//! overlap, so no pixel has two writers, and the max blend makes the result
//! independent of visiting order.

use super::{pixel, pixel_coords, ComputeQueue, FrameJob, FrameTarget};
use crate::error::RenderError;
use std::num::NonZeroUsize;
use std::thread;

/// Scoped-thread queue; `submit` joins every worker before returning
#[derive(Debug, Clone)]
pub struct CpuQueue {
    workers: usize,
}

impl CpuQueue {
    /// `workers == 0` uses the machine's available parallelism
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        } else {
            workers
        };
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

fn paint_band(band: &mut [u32], first_row: u32, width: u32, height: u32, job: &FrameJob<'_>) {
    band.fill(job.background);

    let rows = (band.len() / width as usize) as u32;
    let end_row = first_row + rows;

    for &anchor in job.anchors {
        for sample in job.samples {
            let Some((x, y)) = pixel_coords(anchor, sample, width, height) else {
                continue;
            };
            if y < first_row || y >= end_row {
                continue;
            }
            let idx = ((y - first_row) * width + x) as usize;
            let color = pixel::scale(job.foreground, sample.level);
            band[idx] = pixel::max_channels(band[idx], color);
        }
    }
}

impl ComputeQueue for CpuQueue {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn submit(&mut self, target: &mut FrameTarget<'_>, job: &FrameJob<'_>) -> Result<(), RenderError> {
        let width = target.width();
        let height = target.height();
        if width == 0 || height == 0 {
            return Ok(());
        }

        let bands = self.workers.clamp(1, height as usize);
        let rows_per_band = (height as usize).div_ceil(bands);

        thread::scope(|scope| {
            for (i, band) in target
                .pixels_mut()
                .chunks_mut(rows_per_band * width as usize)
                .enumerate()
            {
                let first_row = (i * rows_per_band) as u32;
                scope.spawn(move || paint_band(band, first_row, width, height, job));
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Anchor;
    use crate::renderer::Phyllotaxis;
    use crate::renderer::Pattern;

    fn render(workers: usize, width: u32, height: u32, anchors: &[Anchor]) -> Vec<u32> {
        let spiral = Phyllotaxis::new(4096);
        let job = FrameJob {
            anchors,
            samples: spiral.samples(),
            background: 0xff10_2030,
            foreground: 0xffff_ffff,
        };
        let mut pixels = vec![0u32; (width * height) as usize];
        let mut target = FrameTarget::new(&mut pixels, width, height).unwrap();
        CpuQueue::new(workers).submit(&mut target, &job).unwrap();
        pixels
    }

    #[test]
    fn test_zero_workers_means_auto() {
        assert!(CpuQueue::new(0).workers() >= 1);
        assert_eq!(CpuQueue::new(3).workers(), 3);
    }

    #[test]
    fn test_worker_count_does_not_change_output() {
        let anchors = [Anchor::new(40.0, 30.0), Anchor::new(70.5, 12.25)];
        let single = render(1, 97, 61, &anchors);

        for workers in [2, 3, 7, 61, 200] {
            assert_eq!(render(workers, 97, 61, &anchors), single, "workers = {}", workers);
        }
    }

    #[test]
    fn test_clear_reaches_every_pixel() {
        // Anchor far away: only the clear kernel writes
        let pixels = render(4, 33, 17, &[Anchor::new(-10_000.0, -10_000.0)]);
        assert!(pixels.iter().all(|&p| p == 0xff10_2030));
    }

    #[test]
    fn test_more_workers_than_rows() {
        let pixels = render(16, 8, 3, &[Anchor::new(4.0, 1.0)]);
        assert_eq!(pixels.len(), 24);
        assert_eq!(pixels[8 + 4], 0xffff_ffff);
    }
}
