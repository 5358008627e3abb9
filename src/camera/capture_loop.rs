//! Background capture thread implementation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use super::buffer::SharedFrameBuffer;
use super::driver::CaptureDriver;
use super::types::{CaptureError, CaptureSettings, Resolution};

/// Counters the capture thread publishes for the session.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    /// Completed grabs
    pub frames: AtomicU64,
    /// Grabs the driver reported as failed
    pub failed: AtomicU64,
}

/// Thread entry point: open the driver, report back, then grab until stopped.
///
/// The open result goes through `info_tx` so `CaptureSession::start` can
/// return driver failures to its caller.
pub fn run_capture_thread<D, F>(
    open: F,
    settings: CaptureSettings,
    buffer: SharedFrameBuffer,
    counters: Arc<CaptureCounters>,
    stop: Arc<AtomicBool>,
    info_tx: Sender<Result<Resolution, CaptureError>>,
) where
    D: CaptureDriver,
    F: FnOnce(&CaptureSettings) -> Result<D, CaptureError>,
{
    let mut driver = match open(&settings) {
        Ok(driver) => driver,
        Err(e) => {
            let _ = info_tx.send(Err(e));
            return;
        }
    };

    let actual = driver.resolution();
    if actual != settings.resolution {
        let _ = info_tx.send(Err(CaptureError::ResolutionMismatch {
            requested: settings.resolution,
            actual,
        }));
        return;
    }
    let _ = info_tx.send(Ok(actual));
    drop(info_tx);

    log::info!(
        "Capture thread started: device {} at {}, gains {}",
        settings.device_index,
        actual,
        settings.gains
    );

    run_capture_loop(&mut driver, &settings, &buffer, &counters, &stop);

    log::info!(
        "Capture thread exiting after {} frames ({} failed grabs)",
        counters.frames.load(Ordering::Acquire),
        counters.failed.load(Ordering::Relaxed)
    );
}

/// Grab frames into `buffer` until `stop` is set.
///
/// Each cycle holds the buffer lock for exactly one `grab` call and bumps
/// the frame counter after releasing it. There is no sleep or rate limit:
/// the driver's own blocking sets the pace.
pub fn run_capture_loop<D: CaptureDriver>(
    driver: &mut D,
    settings: &CaptureSettings,
    buffer: &SharedFrameBuffer,
    counters: &CaptureCounters,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Acquire) {
        let result = match buffer.lock_for_write() {
            Ok(mut frame) => driver.grab(&mut frame, settings.gains),
            Err(e) => {
                log::error!("Stopping capture: {}", e);
                break;
            }
        };

        match result {
            Ok(()) => {
                counters.frames.fetch_add(1, Ordering::Release);
            }
            Err(e) => {
                let failed = counters.failed.fetch_add(1, Ordering::Relaxed) + 1;
                if failed == 1 {
                    log::warn!("Grab failed, keeping previous frame: {}", e);
                } else {
                    log::debug!("Grab failed ({} so far): {}", failed, e);
                }
            }
        }

        // Let a blocked consumer take the lock before the next grab
        while buffer.has_waiting_readers() && !stop.load(Ordering::Acquire) {
            thread::yield_now();
        }
    }
}
