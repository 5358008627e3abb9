//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use super::enums::DriverChoice;
use crate::camera::{ColorGains, Resolution};

/// Capture frames from an LI-USB30-M021 camera on a background thread
#[derive(Parser, Debug)]
#[command(name = "m021-capture")]
#[command(version, about = "Threaded frame capture for the LI-USB30-M021 camera", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Capture for five seconds from the first camera and report the frame rate
    m021-capture --driver camera --duration 5

    # Boost red slightly and save the last frame
    m021-capture -c 1.0,0.9,1.2 --snapshot frame.ppm")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Index of the video device to stream from
    #[arg(short, long)]
    pub device: Option<u32>,

    /// Frame width in pixels (must match a sensor mode)
    #[arg(short, long, value_parser = parse_dimension)]
    pub width: Option<u32>,

    /// Frame height in pixels (must match a sensor mode)
    #[arg(short = 'k', long, value_parser = parse_dimension)]
    pub height: Option<u32>,

    /// Comma separated blue,green,red gains applied to every pixel
    #[arg(short = 'c', long, value_parser = parse_gains)]
    pub color_gains: Option<ColorGains>,

    /// Frame source
    #[arg(long)]
    pub driver: Option<DriverChoice>,

    /// Stop after this many seconds (default: run until Ctrl+C)
    #[arg(long, value_parser = parse_duration_secs)]
    pub duration: Option<Duration>,

    /// Write the last captured frame to this path (PNG for .png, PPM otherwise)
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Milliseconds between stats lines (0 disables)
    #[arg(long)]
    pub report_interval: Option<u64>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available cameras
    ListCameras,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

/// Parse a frame dimension (1..=Resolution::MAX_DIMENSION)
fn parse_dimension(s: &str) -> Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid dimension", s))?;
    if value == 0 || value > Resolution::MAX_DIMENSION {
        return Err(format!(
            "Frame width/height must be between 1 and {}",
            Resolution::MAX_DIMENSION
        ));
    }
    Ok(value)
}

/// Parse "b,g,r" gains
pub fn parse_gains(s: &str) -> Result<ColorGains, String> {
    let values = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| format!("'{}' is not a valid gain", part.trim()))
        })
        .collect::<Result<Vec<f32>, String>>()?;

    match values.as_slice() {
        [blue, green, red] => ColorGains::new(*blue, *green, *red).map_err(|e| e.to_string()),
        _ => Err(format!(
            "Color gains must be a list of 3 values (blue,green,red), got {}",
            values.len()
        )),
    }
}

/// Parse a positive duration in seconds
fn parse_duration_secs(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number of seconds", s))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("Duration must be greater than 0, got {}", s));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| format!("Duration {} is out of range: {}", s, e))
}
