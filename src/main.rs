use clap::Parser;

use m021_capture::camera::{open_driver, CaptureSession, SharedFrameBuffer};
use m021_capture::cli::{self, Args, Command};
use m021_capture::config::Config;
use m021_capture::monitor::{self, ctrlc_received, setup_ctrlc_handler};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Some(Command::ListCameras) => cli::list_cameras(),
        Some(Command::Config { ref action }) => {
            cli::handle_config_action(action.clone(), args.config.as_deref())
        }
        None => {
            if let Err(e) = run_capture(&args) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_capture(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    // If --config is given the file must exist; the default path may be absent
    let config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) if args.config.is_none() => {
            log::warn!("Failed to load config file: {}. Using default settings.", e);
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };
    let opts = cli::resolve_run_options(args, &config)?;

    if let Err(e) = setup_ctrlc_handler() {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }

    println!("Device: {}", opts.settings.device_index);
    println!("Frame Dims: {}", opts.settings.resolution);
    println!("Color Gains: {}", opts.settings.gains);
    println!("Driver: {}", opts.driver.name());

    let buffer = SharedFrameBuffer::new(opts.settings.resolution);
    let driver = opts.driver;
    let mut session = CaptureSession::start(buffer, opts.settings.clone(), move |settings| {
        open_driver(driver, settings)
    })?;

    let summary = monitor::run(&mut session, &opts, ctrlc_received)?;
    println!("{}", summary);
    if summary.failed_grabs > 0 {
        println!("{} grabs failed", summary.failed_grabs);
    }
    Ok(())
}
