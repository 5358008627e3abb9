//! Test-pattern driver for running the capture path without hardware.

use std::thread;
use std::time::Duration;

use super::driver::{apply_gains, check_frame_len, CaptureDriver};
use super::types::{CaptureError, ColorGains, Resolution, BYTES_PER_PIXEL};

/// What the synthetic driver draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pattern {
    /// Diagonal ramp that shifts one step per frame
    #[default]
    Gradient,
    /// Every byte set to the frame generation (wrapping), before gains
    Flat,
}

/// Generates deterministic BGR frames.
#[derive(Debug)]
pub struct SyntheticDriver {
    resolution: Resolution,
    pattern: Pattern,
    frame_interval: Option<Duration>,
    generation: u64,
}

impl SyntheticDriver {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            pattern: Pattern::default(),
            frame_interval: None,
            generation: 0,
        }
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Sleep this long in every grab, like a sensor running at a fixed rate.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Number of frames produced so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn draw(&self, dst: &mut [u8]) {
        match self.pattern {
            Pattern::Flat => dst.fill(self.generation as u8),
            Pattern::Gradient => {
                let width = self.resolution.width as usize;
                let shift = self.generation as usize;
                for (i, px) in dst.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                    let x = i % width;
                    let y = i / width;
                    let v = (x + y + shift) as u8;
                    px[0] = v;
                    px[1] = v.wrapping_add(85);
                    px[2] = v.wrapping_add(170);
                }
            }
        }
    }
}

impl CaptureDriver for SyntheticDriver {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn grab(&mut self, dst: &mut [u8], gains: ColorGains) -> Result<(), CaptureError> {
        check_frame_len(dst, self.resolution)?;
        if let Some(interval) = self.frame_interval {
            thread::sleep(interval);
        }
        self.generation += 1;
        self.draw(dst);
        apply_gains(dst, gains);
        Ok(())
    }
}
