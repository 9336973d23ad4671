//! End-to-end gaze stream tests: raw tracker messages in, window-local and
//! calibrated points out.

use std::io::Write;
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use gaze_mapping::config::Config;
use gaze_mapping::local::client::TcpTransport;
use gaze_mapping::processing::calibration::parse_coefficients;
use gaze_mapping::processing::mapper::ScaleMode;
use gaze_mapping::processing::transport::ChannelTransport;
use gaze_mapping::{ConnectionState, GazeStreamSession, Point};
use serde_json::json;

fn test_config() -> Config {
    let mut config = Config::default();
    config.mapping.scale.scale_factor = 2.0;
    config.mapping.scale.scale_mode = ScaleMode::Divide;
    config.mapping.window.offset = Point::new(100.0, 50.0);
    config.mapping.window.header_height = 10.0;
    config.mapping.window.width = 800.0;
    config.mapping.window.height = 600.0;
    config
}

#[test]
fn test_channel_stream_maps_and_freezes() {
    let (transport, feeder) = ChannelTransport::pair();
    let mut session = GazeStreamSession::from_config(Box::new(transport), &test_config());
    session.connect();

    // (1000, 600) / 2 = (500, 300); minus offset (100, 50) and header 10 * 2^2.
    let pixel = json!({ "pixelX": 1000.0, "pixelY": 600.0, "screenHeight": 1080 });
    feeder.send(pixel.to_string());
    // Normalized: (0.25 * 1920, 0.5 * 1080) / 2 = (240, 270).
    feeder.send(
        json!({ "x": 0.25, "y": 0.5, "screenWidth": 1920, "screenHeight": 1080 }).to_string(),
    );
    feeder.send("garbage");

    assert_eq!(session.drain(), 3);
    assert_eq!(session.message_count(), 2);
    assert_eq!(session.current_gaze_point(), Some(Point::new(140.0, 180.0)));
    assert!(session.error().is_some());
    assert_eq!(session.state(), ConnectionState::Connected);

    session.toggle_freeze();
    feeder.send(json!({ "pixelX": 0.0, "pixelY": 0.0 }).to_string());
    session.drain();
    assert_eq!(session.current_gaze_point(), Some(Point::new(140.0, 180.0)));

    session.toggle_freeze();
    feeder.send(json!({ "pixelX": 1000.0, "pixelY": 600.0 }).to_string());
    session.drain();
    assert_eq!(session.current_gaze_point(), Some(Point::new(400.0, 210.0)));

    feeder.close();
    session.drain();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.current_gaze_point().is_none());
}

#[test]
fn test_session_applies_user_calibration() {
    let (transport, feeder) = ChannelTransport::pair();
    let mut session = GazeStreamSession::from_config(Box::new(transport), &test_config());
    session.connect();

    let user = json!({
        "id": 1,
        "calibration": json!({
            "version": "1.0",
            "affine_coefficients": {
                "a0": 5.0, "a1": 1.0, "a2": 0.0,
                "b0": -5.0, "b1": 0.0, "b2": 1.0
            }
        }).to_string()
    });
    session.set_calibration(parse_coefficients(&user));

    feeder.send(json!({ "pixelX": 1000.0, "pixelY": 600.0 }).to_string());
    session.drain();
    assert_eq!(session.current_gaze_point(), Some(Point::new(400.0, 210.0)));
    assert_eq!(session.calibrated_gaze_point(), Some(Point::new(405.0, 205.0)));

    let broken = json!({ "calibration": "{oops" });
    session.set_calibration(parse_coefficients(&broken));
    assert_eq!(session.calibrated_gaze_point(), Some(Point::new(400.0, 210.0)));
}

#[test]
fn test_tcp_stream_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let tracker = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        for i in 0..5 {
            let x = 200.0 + i as f64 * 20.0;
            let line = json!({ "pixelX": x, "pixelY": 400.0, "screenWidth": 1920 });
            writeln!(stream, "{}", line).unwrap();
            thread::sleep(Duration::from_millis(2));
        }
    });

    let mut config = test_config();
    config.session.address = address.clone();
    let transport = TcpTransport::new(address);
    let mut session = GazeStreamSession::from_config(Box::new(transport), &config);
    session.connect();
    assert!(session.is_connected());

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.is_connected() && Instant::now() < deadline {
        if session.drain() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }
    tracker.join().unwrap();

    assert_eq!(session.message_count(), 5);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.fps() > 0.0);
}
