//! Capture session handle and public API.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::buffer::SharedFrameBuffer;
use super::capture_loop::{run_capture_thread, CaptureCounters};
use super::driver::CaptureDriver;
use super::types::{CaptureError, CaptureSettings, Frame, SessionState};

/// A running capture session.
///
/// Owns the capture thread that keeps refreshing a [`SharedFrameBuffer`]
/// with the newest frame from its driver. Several sessions can run side by
/// side, each with its own buffer.
///
/// The thread runs until [`CaptureSession::stop`] is called or the session
/// is dropped. A grab that never returns cannot be interrupted: `stop` waits
/// for it.
pub struct CaptureSession {
    buffer: SharedFrameBuffer,
    counters: Arc<CaptureCounters>,
    stop_signal: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
    settings: CaptureSettings,
    started_at: Instant,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("settings", &self.settings)
            .field("count", &self.count())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CaptureSession {
    /// Start grabbing into `buffer` on a new thread.
    ///
    /// `open` runs on the capture thread and constructs the driver; this call
    /// blocks until it has returned, then hands back a running session.
    ///
    /// # Errors
    /// * `CaptureError::InvalidGains` - If `settings.gains` are out of range
    /// * `CaptureError::BufferSizeMismatch` - If `buffer` is not sized for `settings.resolution`
    /// * `CaptureError::ThreadSpawn` - If the thread name contains a NUL byte or
    ///   the OS refuses to create the thread
    /// * `CaptureError::ResolutionMismatch` - If the driver delivers another size
    /// * any error returned by `open`
    pub fn start<D, F>(
        buffer: SharedFrameBuffer,
        settings: CaptureSettings,
        open: F,
    ) -> Result<Self, CaptureError>
    where
        D: CaptureDriver,
        F: FnOnce(&CaptureSettings) -> Result<D, CaptureError> + Send + 'static,
    {
        settings.gains.validate()?;
        if buffer.resolution() != settings.resolution {
            return Err(CaptureError::BufferSizeMismatch {
                resolution: settings.resolution,
                expected: settings.resolution.frame_len(),
                actual: buffer.len(),
            });
        }

        let counters = Arc::new(CaptureCounters::default());
        let stop_signal = Arc::new(AtomicBool::new(false));
        let (info_tx, info_rx) = mpsc::channel();

        // Builder::spawn panics on interior NUL bytes in the name
        if settings.thread_name.contains('\0') {
            return Err(CaptureError::ThreadSpawn(io::Error::new(
                io::ErrorKind::InvalidInput,
                "thread name may not contain NUL bytes",
            )));
        }

        let handle = {
            let buffer = buffer.clone();
            let counters = Arc::clone(&counters);
            let stop = Arc::clone(&stop_signal);
            let thread_settings = settings.clone();
            let mut builder = thread::Builder::new().name(settings.thread_name.clone());
            if let Some(size) = settings.stack_size {
                builder = builder.stack_size(size);
            }
            builder
                .spawn(move || {
                    run_capture_thread(open, thread_settings, buffer, counters, stop, info_tx);
                })
                .map_err(CaptureError::ThreadSpawn)?
        };

        // Wait for the thread to report whether the driver opened
        let report = info_rx.recv();
        match report {
            Ok(Ok(_)) => Ok(Self {
                buffer,
                counters,
                stop_signal,
                capture_thread: Some(handle),
                settings,
                started_at: Instant::now(),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Channel closed without a report: the opener panicked
                let _ = handle.join();
                Err(CaptureError::ThreadTerminated)
            }
        }
    }

    /// Number of frames grabbed so far. Never decreases.
    pub fn count(&self) -> u64 {
        self.counters.frames.load(Ordering::Acquire)
    }

    /// Number of grabs the driver reported as failed.
    pub fn failed_grabs(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// The buffer this session writes into.
    pub fn buffer(&self) -> &SharedFrameBuffer {
        &self.buffer
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Time since the driver opened.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average grab rate since start.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.count() as f64 / secs
        } else {
            0.0
        }
    }

    /// Copy the newest frame, tagged with the frame count read under the lock.
    ///
    /// The loop bumps the counter after releasing the lock, so while capture
    /// runs the tag can lag the copied frame by one. Once stopped it is exact.
    pub fn snapshot(&self) -> Result<Frame, CaptureError> {
        let guard = self.buffer.lock()?;
        let sequence = self.count();
        let data = guard.to_vec();
        drop(guard);
        Ok(Frame {
            data,
            width: self.settings.resolution.width,
            height: self.settings.resolution.height,
            sequence,
            timestamp: Instant::now(),
        })
    }

    /// Poll until at least `min_frames` have been grabbed or `timeout` passes.
    ///
    /// Returns `true` if the count was reached.
    pub fn wait_for_frames(&self, min_frames: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count() >= min_frames {
                return true;
            }
            if Instant::now() >= deadline || !self.is_running() {
                return self.count() >= min_frames;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn state(&self) -> SessionState {
        if self.is_running() {
            SessionState::Running
        } else {
            SessionState::Stopped
        }
    }

    /// Check if the capture thread is currently running.
    pub fn is_running(&self) -> bool {
        self.capture_thread
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Signal the capture thread to stop and wait for it to finish.
    ///
    /// Safe to call more than once. The frame count and buffer contents
    /// stay readable afterwards.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);

        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::synthetic::{Pattern, SyntheticDriver};
    use crate::camera::types::{ColorGains, Resolution};

    fn small_settings() -> CaptureSettings {
        CaptureSettings {
            resolution: Resolution::new(16, 8).unwrap(),
            ..CaptureSettings::default()
        }
    }

    #[test]
    fn test_start_and_count_frames() {
        let settings = small_settings();
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let mut session = CaptureSession::start(buffer, settings, |s: &CaptureSettings| {
            Ok(SyntheticDriver::new(s.resolution))
        })
        .unwrap();

        assert!(session.wait_for_frames(1, Duration::from_secs(5)));
        assert!(session.count() >= 1);
        assert_eq!(session.state(), SessionState::Running);

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.is_running());
    }

    #[test]
    fn test_count_survives_stop() {
        let settings = small_settings();
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let mut session = CaptureSession::start(buffer, settings, |s: &CaptureSettings| {
            Ok(SyntheticDriver::new(s.resolution))
        })
        .unwrap();
        assert!(session.wait_for_frames(10, Duration::from_secs(5)));

        session.stop();
        let after_stop = session.count();
        assert!(after_stop >= 10);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(session.count(), after_stop);

        // Stopping twice is fine
        session.stop();
        assert_eq!(session.count(), after_stop);
    }

    #[test]
    fn test_buffer_size_mismatch_is_rejected() {
        let settings = small_settings();
        let buffer = SharedFrameBuffer::new(Resolution::VGA);
        let result = CaptureSession::start(buffer, settings, |s: &CaptureSettings| {
            Ok(SyntheticDriver::new(s.resolution))
        });
        assert!(matches!(
            result,
            Err(CaptureError::BufferSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_gains_are_rejected() {
        let mut settings = small_settings();
        settings.gains = ColorGains {
            blue: -1.0,
            green: 1.0,
            red: 1.0,
        };
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let result = CaptureSession::start(buffer, settings, |s: &CaptureSettings| {
            Ok(SyntheticDriver::new(s.resolution))
        });
        assert!(matches!(result, Err(CaptureError::InvalidGains { .. })));
    }

    #[test]
    fn test_open_failure_is_returned() {
        let settings = small_settings();
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let result = CaptureSession::start(buffer, settings, |_: &CaptureSettings| {
            Err::<SyntheticDriver, _>(CaptureError::OpenFailed("no device".to_string()))
        });
        match result {
            Err(CaptureError::OpenFailed(msg)) => assert_eq!(msg, "no device"),
            other => panic!("Expected OpenFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_panicking_opener_reports_thread_terminated() {
        let settings = small_settings();
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let result = CaptureSession::start(
            buffer,
            settings,
            |_: &CaptureSettings| -> Result<SyntheticDriver, CaptureError> {
                panic!("driver init crashed")
            },
        );
        assert!(matches!(result, Err(CaptureError::ThreadTerminated)));
    }

    #[test]
    fn test_snapshot_is_tagged_with_count() {
        let settings = small_settings();
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let mut session = CaptureSession::start(buffer, settings, |s: &CaptureSettings| {
            Ok(SyntheticDriver::new(s.resolution).with_pattern(Pattern::Flat))
        })
        .unwrap();
        assert!(session.wait_for_frames(3, Duration::from_secs(5)));
        session.stop();

        let frame = session.snapshot().unwrap();
        assert_eq!(frame.sequence, session.count());
        // Flat pattern stamps the generation, which equals the count here
        assert!(frame.data.iter().all(|&b| b == session.count() as u8));
    }

    #[test]
    fn test_nul_in_thread_name_is_spawn_error() {
        let mut settings = small_settings();
        settings.thread_name = "cap\0ture".to_string();
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let (opened_tx, opened_rx) = mpsc::channel();
        let result = CaptureSession::start(buffer.clone(), settings, move |s: &CaptureSettings| {
            let _ = opened_tx.send(());
            Ok(SyntheticDriver::new(s.resolution))
        });

        match result {
            Err(CaptureError::ThreadSpawn(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::InvalidInput)
            }
            other => panic!("Expected ThreadSpawn, got {:?}", other),
        }
        // The opener was dropped without running
        assert!(opened_rx.recv().is_err());
        assert!(buffer.snapshot(0).unwrap().is_blank());
    }

    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    #[test]
    fn test_thread_creation_failure_is_returned() {
        let mut settings = small_settings();
        // Far more address space than any stack mapping can get
        settings.stack_size = Some(usize::MAX / 4);
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let (opened_tx, opened_rx) = mpsc::channel();
        let result = CaptureSession::start(buffer.clone(), settings, move |s: &CaptureSettings| {
            let _ = opened_tx.send(());
            Ok(SyntheticDriver::new(s.resolution))
        });

        assert!(matches!(result, Err(CaptureError::ThreadSpawn(_))));
        assert!(opened_rx.recv().is_err());
        assert!(buffer.snapshot(0).unwrap().is_blank());
    }

    #[test]
    fn test_stack_size_is_applied() {
        let mut settings = small_settings();
        settings.stack_size = Some(256 * 1024);
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let mut session = CaptureSession::start(buffer, settings, |s: &CaptureSettings| {
            Ok(SyntheticDriver::new(s.resolution))
        })
        .unwrap();
        assert!(session.wait_for_frames(1, Duration::from_secs(5)));
        session.stop();
    }

    #[test]
    fn test_running_snapshot_tag_lags_at_most_one() {
        let settings = small_settings();
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let mut session = CaptureSession::start(buffer, settings, |s: &CaptureSettings| {
            Ok(SyntheticDriver::new(s.resolution).with_pattern(Pattern::Flat))
        })
        .unwrap();
        assert!(session.wait_for_frames(1, Duration::from_secs(5)));

        for _ in 0..100 {
            let frame = session.snapshot().unwrap();
            // Flat frames carry their grab number (mod 256)
            let lag = frame.data[0].wrapping_sub(frame.sequence as u8);
            assert!(lag <= 1, "frame {} tagged {}", frame.data[0], frame.sequence);
        }
        session.stop();
    }

    #[test]
    fn test_thread_is_named() {
        let mut settings = small_settings();
        settings.thread_name = "m021-test-thread".to_string();
        let buffer = SharedFrameBuffer::new(settings.resolution);
        let (name_tx, name_rx) = mpsc::channel();
        let mut session = CaptureSession::start(buffer, settings, move |s: &CaptureSettings| {
            let _ = name_tx.send(thread::current().name().map(str::to_string));
            Ok(SyntheticDriver::new(s.resolution))
        })
        .unwrap();
        session.stop();
        assert_eq!(
            name_rx.recv().unwrap().as_deref(),
            Some("m021-test-thread")
        );
    }
}
