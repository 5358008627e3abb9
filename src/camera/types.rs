//! Camera types and data structures.

use std::fmt;
use std::time::Instant;

/// Bytes per BGR pixel.
pub const BYTES_PER_PIXEL: usize = 3;

/// Information about an available camera device.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Device index for selection
    pub index: u32,
    /// Human-readable device name
    pub name: String,
    /// Device description
    pub description: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.description)
    }
}

/// Sensor mode (frame dimensions in pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Full sensor mode of the M021 (1280x720).
    pub const HD: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    /// Cropped 800x460 mode, the one the capture demos default to.
    pub const M021_800X460: Resolution = Resolution {
        width: 800,
        height: 460,
    };

    /// VGA mode (640x480).
    pub const VGA: Resolution = Resolution {
        width: 640,
        height: 480,
    };

    /// Largest accepted width or height.
    pub const MAX_DIMENSION: u32 = 8192;

    pub fn new(width: u32, height: u32) -> Result<Self, CaptureError> {
        let in_range = |v: u32| (1..=Self::MAX_DIMENSION).contains(&v);
        if !in_range(width) || !in_range(height) {
            return Err(CaptureError::InvalidResolution { width, height });
        }
        Ok(Self { width, height })
    }

    /// Size in bytes of one BGR frame at this resolution.
    ///
    /// Saturates for values built without [`Resolution::new`].
    pub fn frame_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(BYTES_PER_PIXEL)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::M021_800X460
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-channel color correction multipliers applied by the driver during a grab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorGains {
    pub blue: f32,
    pub green: f32,
    pub red: f32,
}

impl ColorGains {
    /// Largest accepted gain.
    pub const MAX: f32 = 8.0;

    pub const UNITY: ColorGains = ColorGains {
        blue: 1.0,
        green: 1.0,
        red: 1.0,
    };

    pub fn new(blue: f32, green: f32, red: f32) -> Result<Self, CaptureError> {
        let gains = Self { blue, green, red };
        gains.validate()?;
        Ok(gains)
    }

    /// Check that every gain is finite and within `0.0..=MAX`.
    pub fn validate(&self) -> Result<(), CaptureError> {
        for (channel, value) in [("blue", self.blue), ("green", self.green), ("red", self.red)] {
            if !value.is_finite() || !(0.0..=Self::MAX).contains(&value) {
                return Err(CaptureError::InvalidGains {
                    channel,
                    value,
                    max: Self::MAX,
                });
            }
        }
        Ok(())
    }

    pub fn is_unity(&self) -> bool {
        *self == Self::UNITY
    }

    /// Gains in buffer channel order (B, G, R).
    pub fn as_bgr(&self) -> [f32; 3] {
        [self.blue, self.green, self.red]
    }
}

impl Default for ColorGains {
    fn default() -> Self {
        Self::UNITY
    }
}

impl fmt::Display for ColorGains {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.blue, self.green, self.red)
    }
}

/// A consumer-side copy of the shared frame buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data, BGR, row-major
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame counter value when the copy was taken; may trail the copied
    /// frame by one while capture is running
    pub sequence: u64,
    /// When the copy was taken
    pub timestamp: Instant,
}

impl Frame {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    /// BGR triple at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.data.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2]])
    }

    /// True if no grab has written anything yet (or the sensor is black).
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }
}

/// Settings for a capture session.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Camera device index
    pub device_index: u32,
    /// Sensor mode; must match the shared buffer
    pub resolution: Resolution,
    /// Color correction applied during each grab
    pub gains: ColorGains,
    /// Name given to the capture thread
    pub thread_name: String,
    /// Stack size for the capture thread; `None` uses the platform default
    pub stack_size: Option<usize>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            resolution: Resolution::default(),
            gains: ColorGains::default(),
            thread_name: "m021-capture".to_string(),
            stack_size: None,
        }
    }
}

/// Lifecycle of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Capture thread is grabbing frames
    Running,
    /// Capture thread has exited (stopped, or the driver poisoned the buffer)
    Stopped,
}

/// Errors that can occur during capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(
        "Invalid resolution {width}x{height}: width and height must be between 1 and {max}",
        max = Resolution::MAX_DIMENSION
    )]
    InvalidResolution { width: u32, height: u32 },

    #[error("Invalid {channel} gain {value}: must be between 0.0 and {max}")]
    InvalidGains {
        channel: &'static str,
        value: f32,
        max: f32,
    },

    #[error("Frame buffer holds {actual} bytes but {resolution} BGR needs {expected}")]
    BufferSizeMismatch {
        resolution: Resolution,
        expected: usize,
        actual: usize,
    },

    #[error("Driver delivers {actual} frames but {requested} was requested")]
    ResolutionMismatch {
        requested: Resolution,
        actual: Resolution,
    },

    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Failed to query cameras: {0}")]
    QueryFailed(String),

    #[error("Failed to open camera: {0}")]
    OpenFailed(String),

    #[error("Camera permission denied. Check that your user can access the video device")]
    PermissionDenied,

    #[error("Camera device {0} not found. Run 'list-cameras' to see available devices")]
    DeviceNotFound(u32),

    #[error("Failed to start camera stream: {0}")]
    StreamFailed(String),

    #[error("Failed to grab frame: {0}")]
    GrabFailed(String),

    #[error("{0} driver is not available in this build")]
    DriverUnavailable(&'static str),

    #[error("Frame buffer lock poisoned by a panicking writer")]
    Poisoned,

    #[error("Capture thread terminated unexpectedly")]
    ThreadTerminated,
}
