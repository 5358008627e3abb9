//! Consumer side of a capture run.
//!
//! Polls a running [`CaptureSession`], logs frame statistics at a fixed
//! interval and, when asked to stop, tears the session down and reports
//! the achieved frame rate.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::camera::frame_utils::{downscale_half, motion_score, save_frame, to_gray, FrameStats};
use crate::camera::{CaptureError, CaptureSession, Frame};
use crate::cli::RunOptions;

/// How often the stop conditions are checked.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Global flag for handling Ctrl+C across the application
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Check if Ctrl+C has been received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler.
///
/// This should be called once at program startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

/// Errors from the consumer loop.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Failed to write snapshot '{}': {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Outcome of a capture run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub frames: u64,
    pub failed_grabs: u64,
    pub elapsed: Duration,
    /// Motion score of the last two reported frames, if two were reported
    pub last_motion: Option<f64>,
    pub snapshot: Option<PathBuf>,
}

impl RunSummary {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames in {:.2} seconds = {:.2} fps",
            self.frames,
            self.elapsed.as_secs_f64(),
            self.fps()
        )
    }
}

/// Keeps the grayscale copy of the previous report for motion scoring.
#[derive(Default)]
struct Reporter {
    gray: Vec<u8>,
    small: Vec<u8>,
    prev_small: Vec<u8>,
    last_motion: Option<f64>,
}

impl Reporter {
    fn report(&mut self, frame: &Frame, session: &CaptureSession) {
        let stats = FrameStats::of(&frame.data);

        to_gray(&frame.data, &mut self.gray);
        downscale_half(
            &self.gray,
            frame.width as usize,
            frame.height as usize,
            &mut self.small,
        );
        let motion = motion_score(&self.prev_small, &self.small);
        std::mem::swap(&mut self.prev_small, &mut self.small);
        if motion.is_some() {
            self.last_motion = motion;
        }

        log::info!(
            "frame {} ({:.1} fps): mean b/g/r {:.1}/{:.1}/{:.1}, motion {}",
            frame.sequence,
            session.fps(),
            stats.mean_blue,
            stats.mean_green,
            stats.mean_red,
            motion
                .map(|m| format!("{:.2}", m))
                .unwrap_or_else(|| "-".to_string()),
        );
        if stats.nonzero == 0.0 {
            log::debug!("frame {} is blank", frame.sequence);
        }
    }
}

/// Consume frames from `session` until `should_stop` returns true, the
/// configured duration elapses, or the capture thread exits.
///
/// The session is stopped before returning.
pub fn run(
    session: &mut CaptureSession,
    opts: &RunOptions,
    should_stop: impl Fn() -> bool,
) -> Result<RunSummary, MonitorError> {
    let started = Instant::now();
    let mut reporter = Reporter::default();
    let mut next_report = opts.report_interval.map(|i| started + i);

    loop {
        if should_stop() {
            break;
        }
        if opts.duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        if !session.is_running() {
            log::warn!("Capture thread stopped on its own");
            break;
        }

        if let (Some(due), Some(interval)) = (next_report, opts.report_interval) {
            if Instant::now() >= due {
                let frame = session.snapshot()?;
                reporter.report(&frame, session);
                next_report = Some(due + interval);
            }
        }

        thread::sleep(POLL_INTERVAL);
    }

    session.stop();
    let elapsed = started.elapsed();

    if let Some(path) = &opts.snapshot {
        let frame = session.snapshot()?;
        save_snapshot(&frame, path)?;
        log::info!("Wrote frame {} to {}", frame.sequence, path.display());
    }

    Ok(RunSummary {
        frames: session.count(),
        failed_grabs: session.failed_grabs(),
        elapsed,
        last_motion: reporter.last_motion,
        snapshot: opts.snapshot.clone(),
    })
}

/// Write `frame` to `path` (PNG for `.png`, PPM otherwise).
pub fn save_snapshot(frame: &Frame, path: &Path) -> Result<(), MonitorError> {
    save_frame(frame, path).map_err(|source| MonitorError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}
