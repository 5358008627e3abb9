//! Subcommand handlers and merging of CLI arguments with the config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::args::{Args, ConfigAction};
use crate::camera::{self, CaptureSettings, DriverKind, Resolution};
use crate::config::{default_path as get_config_path, Config, ConfigError, DEFAULT_CONFIG};

/// Everything the capture run needs, after merging CLI > config > defaults.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub settings: CaptureSettings,
    pub driver: DriverKind,
    pub duration: Option<Duration>,
    pub snapshot: Option<PathBuf>,
    pub report_interval: Option<Duration>,
}

/// Merge parsed arguments over a loaded config.
pub fn resolve_run_options(args: &Args, config: &Config) -> Result<RunOptions, ConfigError> {
    let width = args.width.unwrap_or(config.camera.width);
    let height = args.height.unwrap_or(config.camera.height);
    let resolution = Resolution::new(width, height).map_err(ConfigError::Invalid)?;

    let gains = match args.color_gains {
        Some(gains) => gains,
        None => config.gains()?,
    };

    let driver = match (args.driver, config.camera.driver) {
        (Some(choice), _) => choice.into(),
        (None, Some(kind)) => kind,
        (None, None) => DriverKind::default(),
    };

    let interval_ms = args.report_interval.unwrap_or(config.report.interval_ms);

    Ok(RunOptions {
        settings: CaptureSettings {
            device_index: args.device.unwrap_or(config.camera.device),
            resolution,
            gains,
            ..CaptureSettings::default()
        },
        driver,
        duration: args.duration,
        snapshot: args.snapshot.clone(),
        report_interval: (interval_ms > 0).then(|| Duration::from_millis(interval_ms)),
    })
}

/// List available cameras and print them to stdout.
pub fn list_cameras() {
    match camera::list_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("No cameras found.");
                println!();
                println!("Make sure the camera is connected and your user can open /dev/video*.");
            } else {
                println!("Available cameras:");
                for device in devices {
                    println!("  {}", device);
                }
                println!();
                println!("Use --device <index> to select a camera.");
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, config_path: Option<&Path>) {
    match action {
        ConfigAction::Show => {
            let config = match Config::load(config_path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            print!("{}", describe_config(&config));
            println!();

            let path = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
            if path.exists() {
                println!("Config file: {} (exists)", path.display());
            } else {
                println!("Config file: {} (not found, using defaults)", path.display());
            }
        }
        ConfigAction::Init => {
            let path = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
            if let Err(e) = write_default_config(&path) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
            println!("Created config file: {}", path.display());
        }
    }
}

/// Human-readable summary of a config, one setting per line.
pub fn describe_config(config: &Config) -> String {
    format!(
        "Current configuration:\n  Device: {}\n  Frame: {}x{}\n  Driver: {}\n  Gains (b,g,r): {},{},{}\n  Report interval: {} ms\n",
        config.camera.device,
        config.camera.width,
        config.camera.height,
        config.camera.driver.unwrap_or_default().name(),
        config.color.blue,
        config.color.green,
        config.color.red,
        config.report.interval_ms,
    )
}

/// Write [`DEFAULT_CONFIG`] to `path`, refusing to overwrite.
pub fn write_default_config(path: &Path) -> Result<(), String> {
    if path.exists() {
        return Err(format!(
            "Config file already exists: {}\nUse 'm021-capture config show' to view current settings.",
            path.display()
        ));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Error creating config directory: {}", e))?;
    }

    std::fs::write(path, DEFAULT_CONFIG).map_err(|e| format!("Error writing config file: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ColorGains;
    use clap::Parser;

    #[test]
    fn test_resolve_defaults() {
        let args = Args::parse_from(["m021-capture"]);
        let opts = resolve_run_options(&args, &Config::default()).unwrap();
        assert_eq!(opts.settings.device_index, 0);
        assert_eq!(opts.settings.resolution, Resolution::M021_800X460);
        assert!(opts.settings.gains.is_unity());
        assert_eq!(opts.driver, DriverKind::Synthetic);
        assert!(opts.duration.is_none());
        assert_eq!(opts.report_interval, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_cli_overrides_config() {
        let config: Config = toml::from_str(
            "[camera]\ndevice = 3\nwidth = 1280\nheight = 720\ndriver = \"camera\"\n[color]\nred = 2.0\n",
        )
        .unwrap();
        let args = Args::parse_from([
            "m021-capture",
            "-d",
            "1",
            "-w",
            "640",
            "-k",
            "480",
            "--driver",
            "synthetic",
            "-c",
            "1,1,1",
            "--report-interval",
            "0",
        ]);
        let opts = resolve_run_options(&args, &config).unwrap();
        assert_eq!(opts.settings.device_index, 1);
        assert_eq!(opts.settings.resolution, Resolution::VGA);
        assert_eq!(opts.driver, DriverKind::Synthetic);
        assert!(opts.settings.gains.is_unity());
        assert!(opts.report_interval.is_none());
    }

    #[test]
    fn test_config_values_used_when_cli_silent() {
        let config: Config = toml::from_str(
            "[camera]\ndevice = 3\nwidth = 1280\nheight = 720\ndriver = \"camera\"\n[color]\nred = 2.0\n",
        )
        .unwrap();
        let args = Args::parse_from(["m021-capture", "--duration", "1.5"]);
        let opts = resolve_run_options(&args, &config).unwrap();
        assert_eq!(opts.settings.device_index, 3);
        assert_eq!(opts.settings.resolution, Resolution::HD);
        assert_eq!(opts.driver, DriverKind::Camera);
        assert_eq!(opts.settings.gains, ColorGains::new(1.0, 1.0, 2.0).unwrap());
        assert_eq!(opts.duration, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_invalid_config_gains_rejected() {
        let config: Config = toml::from_str("[color]\nblue = -2.0\n").unwrap();
        let args = Args::parse_from(["m021-capture"]);
        assert!(matches!(
            resolve_run_options(&args, &config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_large_duration_is_parse_error_not_panic() {
        let args = Args::try_parse_from(["m021-capture", "--duration", "1e300"]);
        assert!(args.is_err());

        let args = Args::parse_from(["m021-capture", "--duration", "86400"]);
        let opts = resolve_run_options(&args, &Config::default()).unwrap();
        assert_eq!(opts.duration, Some(Duration::from_secs(86400)));
    }

    #[test]
    fn test_oversize_config_resolution_rejected() {
        let config: Config =
            toml::from_str("[camera]\nwidth = 4294967295\nheight = 4294967295\n").unwrap();
        let args = Args::parse_from(["m021-capture"]);
        assert!(matches!(
            resolve_run_options(&args, &config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_describe_config() {
        let text = describe_config(&Config::default());
        assert!(text.contains("Frame: 800x460"));
        assert!(text.contains("Driver: synthetic"));
        assert!(text.contains("Gains (b,g,r): 1,1,1"));
    }

    #[test]
    fn test_write_default_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default_config(&path).unwrap();
        let loaded = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded.camera.driver, Some(DriverKind::Synthetic));

        let err = write_default_config(&path).unwrap_err();
        assert!(err.contains("already exists"));
    }
}
