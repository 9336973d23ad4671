use rand::Rng;
use serde_json::{json, Value};
use std::io::{self, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{load_config, Config};
use crate::utils::log::{read_recording, RecordedSample};

// -----------------------------------------------------------------------------
// SETUP FOR THE SIMULATED TRACKER
// -----------------------------------------------------------------------------

const SLEEP_TIME: u64 = 10;
const SCREEN_WIDTH: f64 = 1920.0;
const SCREEN_HEIGHT: f64 = 1080.0;
const FIXATION_MIN_SAMPLES: usize = 20;
const FIXATION_MAX_SAMPLES: usize = 60;
const JITTER_PX: f64 = 8.0;
const BLINK_PERCENT: u32 = 2;
const NORMALIZED_PERCENT: u32 = 30;

/// Fixation/saccade gaze generator.
#[derive(Debug, Clone)]
pub struct SimulatedGaze {
    fixation: (f64, f64),
    remaining: usize,
    timestamp_ms: u64,
}

impl SimulatedGaze {
    pub fn new() -> Self {
        Self {
            fixation: (SCREEN_WIDTH / 2.0, SCREEN_HEIGHT / 2.0),
            remaining: 0,
            timestamp_ms: 0,
        }
    }

    /// Next message. Mostly pixel samples, some normalized ones, and the
    /// occasional blink with no coordinates.
    pub fn next_message<R: Rng>(&mut self, rng: &mut R) -> Value {
        self.timestamp_ms += SLEEP_TIME;

        if self.remaining == 0 {
            self.fixation = (
                rng.gen_range(0.0..SCREEN_WIDTH),
                rng.gen_range(0.0..SCREEN_HEIGHT),
            );
            self.remaining = rng.gen_range(FIXATION_MIN_SAMPLES..=FIXATION_MAX_SAMPLES);
        }
        self.remaining -= 1;

        if rng.gen_range(0..100) < BLINK_PERCENT {
            return json!({ "timestamp": self.timestamp_ms, "confidence": 0.0 });
        }

        let x = (self.fixation.0 + rng.gen_range(-JITTER_PX..JITTER_PX)).clamp(0.0, SCREEN_WIDTH);
        let y = (self.fixation.1 + rng.gen_range(-JITTER_PX..JITTER_PX)).clamp(0.0, SCREEN_HEIGHT);

        if rng.gen_range(0..100) < NORMALIZED_PERCENT {
            json!({
                "x": x / SCREEN_WIDTH,
                "y": y / SCREEN_HEIGHT,
                "screenWidth": SCREEN_WIDTH,
                "screenHeight": SCREEN_HEIGHT,
                "timestamp": self.timestamp_ms,
                "confidence": 0.9,
            })
        } else {
            json!({
                "pixelX": x,
                "pixelY": y,
                "screenWidth": SCREEN_WIDTH,
                "screenHeight": SCREEN_HEIGHT,
                "timestamp": self.timestamp_ms,
                "confidence": 0.9,
            })
        }
    }
}

impl Default for SimulatedGaze {
    fn default() -> Self {
        Self::new()
    }
}

fn recorded_message(sample: &RecordedSample) -> Value {
    json!({
        "pixelX": sample.screen_x,
        "pixelY": sample.screen_y,
        "screenWidth": SCREEN_WIDTH,
        "screenHeight": SCREEN_HEIGHT,
        "timestamp": sample.timestamp_ms,
    })
}

// -----------------------------------------------------------------------------
// RUN CODE
// -----------------------------------------------------------------------------

pub fn run(config_path: Option<&Path>, recording_path: Option<&Path>) -> io::Result<()> {
    let config = match config_path {
        Some(path) => {
            load_config(path).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?
        }
        None => Config::default(),
    };

    let recording = match recording_path {
        Some(path) => {
            let samples =
                read_recording(path).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
            info!("Replaying {} recorded samples from {}", samples.len(), path.display());
            Some(Arc::new(samples))
        }
        None => None,
    };

    let listener = TcpListener::bind(&config.session.address)?;
    info!("Simulated tracker listening on {}", config.session.address);

    for stream in listener.incoming() {
        let stream = stream?;
        let peer = stream.peer_addr()?;
        info!("Client connected: {}", peer);

        let recording = recording.clone();
        thread::spawn(move || {
            let result = match recording {
                Some(samples) => send_recorded(stream, &samples),
                None => simulated_loop(stream),
            };
            if let Err(e) = result {
                warn!("Client {} dropped: {}", peer, e);
            }
        });
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// SENDING DATA
// -----------------------------------------------------------------------------

fn send_line(stream: &mut TcpStream, message: &Value) -> io::Result<()> {
    writeln!(stream, "{}", message)?;
    stream.flush()
}

fn send_recorded(mut stream: TcpStream, samples: &[RecordedSample]) -> io::Result<()> {
    for sample in samples {
        send_line(&mut stream, &recorded_message(sample))?;
        thread::sleep(Duration::from_millis(SLEEP_TIME));
    }
    Ok(())
}

fn simulated_loop(mut stream: TcpStream) -> io::Result<()> {
    let mut rng = rand::thread_rng();
    let mut gaze = SimulatedGaze::new();

    loop {
        send_line(&mut stream, &gaze.next_message(&mut rng))?;
        thread::sleep(Duration::from_millis(SLEEP_TIME));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::mapper::{GazeSample, RawGazeMessage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_simulated_messages_stay_on_screen() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut gaze = SimulatedGaze::new();
        let mut usable = 0;

        for _ in 0..500 {
            let message: RawGazeMessage =
                serde_json::from_value(gaze.next_message(&mut rng)).unwrap();
            if let Some(sample) = GazeSample::from_message(&message) {
                let p = sample.screen_point();
                assert!((0.0..=SCREEN_WIDTH + 1e-9).contains(&p.x), "x = {}", p.x);
                assert!((0.0..=SCREEN_HEIGHT + 1e-9).contains(&p.y), "y = {}", p.y);
                usable += 1;
            }
        }

        assert!(usable > 400, "only {} usable samples", usable);
    }

    #[test]
    fn test_recorded_message_uses_screen_position() {
        let sample = RecordedSample {
            timestamp_ms: 5,
            screen_x: 300.0,
            screen_y: 200.0,
            x: 1.0,
            y: 2.0,
        };
        let message = recorded_message(&sample);
        assert_eq!(message["pixelX"], json!(300.0));
        assert_eq!(message["pixelY"], json!(200.0));
    }
}
