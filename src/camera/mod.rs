//! Camera capture: a driver polled on a dedicated thread into a shared buffer.
//!
//! - Buffer via [`SharedFrameBuffer`] (single-slot, last writer wins)
//! - Session via [`CaptureSession`]
//! - Drivers via [`CaptureDriver`], [`SyntheticDriver`] and (feature `camera`)
//!   the USB camera driver
//! - Configuration via [`CaptureSettings`], [`Resolution`] and [`ColorGains`]

mod buffer;
mod capture;
mod capture_loop;
#[cfg(feature = "camera")]
mod device;
mod driver;
pub mod frame_utils;
mod synthetic;
mod types;

pub use buffer::{FrameGuard, SharedFrameBuffer};
pub use capture::CaptureSession;
pub use capture_loop::{run_capture_loop, CaptureCounters};
#[cfg(feature = "camera")]
pub use device::{list_devices, UsbCameraDriver};
#[cfg(not(feature = "camera"))]
pub use driver::list_devices;
pub use driver::{apply_gains, open_driver, CaptureDriver, DriverKind};
pub use synthetic::{Pattern, SyntheticDriver};
pub use types::{
    CameraInfo, CaptureError, CaptureSettings, ColorGains, Frame, Resolution, SessionState,
    BYTES_PER_PIXEL,
};
