//! Capture driver seam.
//!
//! A driver owns the device handle (opened by its constructor, released on
//! drop) and fills a BGR buffer with one frame per [`CaptureDriver::grab`].

use super::synthetic::SyntheticDriver;
#[cfg(not(feature = "camera"))]
use super::types::CameraInfo;
use super::types::{CaptureError, CaptureSettings, ColorGains, Resolution, BYTES_PER_PIXEL};

/// A frame source the capture loop can poll.
///
/// Drivers are opened on the capture thread, so implementations need not be
/// `Send`.
pub trait CaptureDriver {
    /// Frame dimensions this driver delivers.
    fn resolution(&self) -> Resolution;

    /// Fill `dst` (exactly `resolution().frame_len()` bytes, BGR) with the
    /// next frame, applying `gains`. May block until the device has a frame.
    fn grab(&mut self, dst: &mut [u8], gains: ColorGains) -> Result<(), CaptureError>;
}

impl<D: CaptureDriver + ?Sized> CaptureDriver for Box<D> {
    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }

    fn grab(&mut self, dst: &mut [u8], gains: ColorGains) -> Result<(), CaptureError> {
        (**self).grab(dst, gains)
    }
}

/// Which driver implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Generated test pattern, no hardware needed
    #[default]
    Synthetic,
    /// USB camera via the platform capture backend
    Camera,
}

impl DriverKind {
    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::Synthetic => "synthetic",
            DriverKind::Camera => "camera",
        }
    }
}

/// Open the driver selected by `kind` for `settings`.
///
/// Meant to be called from the capture thread (see `CaptureSession::start`).
pub fn open_driver(
    kind: DriverKind,
    settings: &CaptureSettings,
) -> Result<Box<dyn CaptureDriver>, CaptureError> {
    match kind {
        DriverKind::Synthetic => Ok(Box::new(SyntheticDriver::new(settings.resolution))),
        DriverKind::Camera => open_camera(settings),
    }
}

#[cfg(feature = "camera")]
fn open_camera(settings: &CaptureSettings) -> Result<Box<dyn CaptureDriver>, CaptureError> {
    let driver = super::device::UsbCameraDriver::open(settings.device_index, settings.resolution)?;
    Ok(Box::new(driver))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_settings: &CaptureSettings) -> Result<Box<dyn CaptureDriver>, CaptureError> {
    Err(CaptureError::DriverUnavailable(DriverKind::Camera.name()))
}

/// Camera enumeration is only available with the `camera` feature.
#[cfg(not(feature = "camera"))]
pub fn list_devices() -> Result<Vec<CameraInfo>, CaptureError> {
    Err(CaptureError::DriverUnavailable(DriverKind::Camera.name()))
}

/// Multiply each BGR channel by its gain, rounding and clamping to `0..=255`.
pub fn apply_gains(bgr: &mut [u8], gains: ColorGains) {
    if gains.is_unity() {
        return;
    }
    let factors = gains.as_bgr();
    for px in bgr.chunks_exact_mut(BYTES_PER_PIXEL) {
        for (value, factor) in px.iter_mut().zip(factors) {
            *value = scale(*value, factor);
        }
    }
}

fn scale(value: u8, factor: f32) -> u8 {
    (value as f32 * factor).round().clamp(0.0, 255.0) as u8
}

/// Check that `dst` can hold one frame at `resolution`.
pub(crate) fn check_frame_len(dst: &[u8], resolution: Resolution) -> Result<(), CaptureError> {
    let expected = resolution.frame_len();
    if dst.len() != expected {
        return Err(CaptureError::BufferSizeMismatch {
            resolution,
            expected,
            actual: dst.len(),
        });
    }
    Ok(())
}
