use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use gaze_mapping::config::{load_config, Config};
use gaze_mapping::local::{client, server};
use gaze_mapping::processing::calibration::{CalibrationRecord, CalibrationTarget};

fn calibrate(config_path: Option<&Path>, targets_path: Option<&Path>) -> io::Result<()> {
    let config = match config_path {
        Some(path) => {
            load_config(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        }
        None => Config::default(),
    };
    let Some(targets_path) = targets_path else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "calibrate needs a targets JSON file",
        ));
    };

    let text = std::fs::read_to_string(targets_path)?;
    let targets: Vec<CalibrationTarget> = serde_json::from_str(&text)?;
    let record = CalibrationRecord::from_targets(
        &targets,
        Utc::now().timestamp_millis(),
        config.aggregation.tolerance,
        config.aggregation.max_iterations,
    );
    let blob = record
        .to_blob()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    println!("{}", blob);
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(2).map(PathBuf::from);
    let extra_path = args.get(3).map(PathBuf::from);

    let result = match args.get(1).map(String::as_str) {
        Some("client") => client::run(config_path.as_deref()),
        Some("server") => server::run(config_path.as_deref(), extra_path.as_deref()),
        Some("calibrate") => calibrate(config_path.as_deref(), extra_path.as_deref()),
        Some(_) => {
            println!("Invalid argument, please use 'client', 'server' or 'calibrate'");
            return;
        }
        None => {
            println!("Usage: gaze-mapping <client|server|calibrate> [config.yaml] [file]");
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
