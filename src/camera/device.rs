//! USB camera driver and device enumeration (feature `camera`).

use nokhwa::pixel_format::RgbFormat;
use nokhwa::query;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;

use super::driver::{apply_gains, check_frame_len, CaptureDriver};
use super::types::{CameraInfo, CaptureError, ColorGains, Resolution, BYTES_PER_PIXEL};

/// Frame rate requested from the device. The M021 tops out around 60 fps at 800x460.
const REQUESTED_FPS: u32 = 60;

/// List all available camera devices on the system.
///
/// If no cameras are found, returns an empty vector (not an error).
pub fn list_devices() -> Result<Vec<CameraInfo>, CaptureError> {
    let devices = query(ApiBackend::Auto).map_err(|e| CaptureError::QueryFailed(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|d| CameraInfo {
            index: d.index().as_index().unwrap_or(0),
            name: d.human_name(),
            description: d.description().to_string(),
        })
        .collect())
}

/// Camera opened through nokhwa, streaming until dropped.
pub struct UsbCameraDriver {
    camera: Camera,
    resolution: Resolution,
}

impl UsbCameraDriver {
    /// Open device `index` and start its stream at `resolution`.
    pub fn open(index: u32, resolution: Resolution) -> Result<Self, CaptureError> {
        let devices = list_devices()?;
        if !devices.iter().any(|d| d.index == index) {
            return Err(CaptureError::DeviceNotFound(index));
        }

        let mut camera = open_camera_with_fallback(&CameraIndex::Index(index), resolution)?;
        camera
            .open_stream()
            .map_err(|e| CaptureError::StreamFailed(e.to_string()))?;

        let actual = camera.resolution();
        let actual = Resolution {
            width: actual.width(),
            height: actual.height(),
        };
        log::info!(
            "Opened camera {} at {} ({} fps)",
            index,
            actual,
            camera.frame_rate()
        );

        Ok(Self {
            camera,
            resolution: actual,
        })
    }
}

impl CaptureDriver for UsbCameraDriver {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn grab(&mut self, dst: &mut [u8], gains: ColorGains) -> Result<(), CaptureError> {
        check_frame_len(dst, self.resolution)?;

        let raw = self
            .camera
            .frame()
            .map_err(|e| CaptureError::GrabFailed(e.to_string()))?;
        let decoded = raw
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::GrabFailed(e.to_string()))?;
        let rgb = decoded.into_raw();
        if rgb.len() != dst.len() {
            return Err(CaptureError::GrabFailed(format!(
                "decoded {} bytes, expected {}",
                rgb.len(),
                dst.len()
            )));
        }

        rgb_to_bgr(&rgb, dst);
        apply_gains(dst, gains);
        Ok(())
    }
}

impl Drop for UsbCameraDriver {
    fn drop(&mut self) {
        let _ = self.camera.stop_stream();
    }
}

/// Copy RGB pixels into `dst` with the channel order swapped to BGR.
fn rgb_to_bgr(rgb: &[u8], dst: &mut [u8]) {
    for (src, out) in rgb
        .chunks_exact(BYTES_PER_PIXEL)
        .zip(dst.chunks_exact_mut(BYTES_PER_PIXEL))
    {
        out[0] = src[2];
        out[1] = src[1];
        out[2] = src[0];
    }
}

/// Try to open a camera with multiple format fallback strategies.
fn open_camera_with_fallback(
    index: &CameraIndex,
    resolution: Resolution,
) -> Result<Camera, CaptureError> {
    let wanted = nokhwa::utils::Resolution::new(resolution.width, resolution.height);
    let format_attempts = [
        RequestedFormatType::Exact(CameraFormat::new(
            wanted,
            NokhwaFrameFormat::YUYV,
            REQUESTED_FPS,
        )),
        RequestedFormatType::Closest(CameraFormat::new(
            wanted,
            NokhwaFrameFormat::MJPEG,
            REQUESTED_FPS,
        )),
        RequestedFormatType::AbsoluteHighestResolution,
    ];

    let mut last_error = None;
    for requested in format_attempts {
        let label = format!("{:?}", requested);
        match Camera::new(index.clone(), RequestedFormat::new::<RgbFormat>(requested)) {
            Ok(cam) => return Ok(cam),
            Err(e) => {
                log::debug!("Camera format {} rejected: {}", label, e);
                last_error = Some(e);
            }
        }
    }

    let msg = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no format accepted".to_string());
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("access") {
        Err(CaptureError::PermissionDenied)
    } else {
        Err(CaptureError::OpenFailed(msg))
    }
}
