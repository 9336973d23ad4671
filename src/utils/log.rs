use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

use crate::processing::mapper::{GazeSample, MappedPoint};
use crate::processing::session::GazeObserver;

const LOG_DIR: &str = "logs";

/// Logs a message to a file with timestamp
///
/// # Arguments
///
/// * `filename` - The name of the log file (created under `logs/`)
/// * `message` - The message to log
pub fn log_to_file(filename: &str, message: &str) -> io::Result<()> {
    log_to_file_in(Path::new(LOG_DIR), filename, message)
}

pub fn log_to_file_in(log_dir: &Path, filename: &str, message: &str) -> io::Result<()> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(filename))?;

    writeln!(file, "[{}] {}", Local::now().to_rfc3339(), message)?;
    file.flush()?;

    Ok(())
}

// GAZE RECORDING --------------------------------------------------------------

/// One recorded sample: device screen position and the mapped point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub timestamp_ms: i64,
    pub screen_x: f64,
    pub screen_y: f64,
    pub x: f64,
    pub y: f64,
}

/// Appends every accepted sample to a CSV file.
pub struct GazeRecorder {
    writer: csv::Writer<File>,
    failed: bool,
}

impl GazeRecorder {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
            failed: false,
        })
    }

    pub fn record(&mut self, sample: RecordedSample) -> Result<(), csv::Error> {
        self.writer.serialize(sample)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl GazeObserver for GazeRecorder {
    fn on_gaze_update(&mut self, point: MappedPoint, sample: &GazeSample) {
        let screen = sample.screen_point();
        let row = RecordedSample {
            timestamp_ms: Utc::now().timestamp_millis(),
            screen_x: screen.x,
            screen_y: screen.y,
            x: point.x,
            y: point.y,
        };
        if let Err(e) = self.record(row) {
            // Report once; the session keeps running without a recording.
            if !self.failed {
                warn!("Failed to record gaze sample: {}", e);
                self.failed = true;
            }
        }
    }
}

pub fn read_recording<P: AsRef<Path>>(path: P) -> Result<Vec<RecordedSample>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    reader.deserialize().collect()
}
