use serde_json::Value;
use std::collections::VecDeque;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::calibration::{self, CalibrationCoefficients};
use super::mapper::{CoordinateMapper, GazeSample, MappedPoint, RawGazeMessage};
use super::statistics::Point;
use super::transport::{GazeTransport, TransportEvent};
use crate::config::Config;

pub const FPS_WINDOW: usize = 60;

// -----------------------------------------------------------------------------
// SESSION TYPES
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected, but new samples are not consumed.
    Frozen,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Frozen => "frozen",
        }
    }
}

/// The last error recorded by the session, kept for display.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Invalid message format")]
    InvalidMessage,

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Receives every accepted (non-frozen) update.
pub trait GazeObserver: Send {
    fn on_gaze_update(&mut self, point: MappedPoint, sample: &GazeSample);

    fn on_tracking_data_update(&mut self, _data: &Value) {}
}

/// Answers window placement queries for the mapper.
pub trait WindowGeometryProvider {
    fn window_position(&self) -> Option<Point>;
    fn display_scale_factor(&self) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq)]
struct FrozenSnapshot {
    gaze_point: MappedPoint,
    tracking_data: Value,
}

// FPS COMPONENT ---------------------------------------------------------------

/// Sliding window of arrival times in milliseconds.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    timestamps: VecDeque<f64>,
    capacity: usize,
    fps: f64,
}

impl FpsCounter {
    pub fn new(capacity: usize) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
            fps: 0.0,
        }
    }

    pub fn push(&mut self, timestamp_ms: f64) {
        if self.timestamps.len() >= self.capacity {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(timestamp_ms);

        if let (Some(first), Some(last)) = (self.timestamps.front(), self.timestamps.back()) {
            let elapsed = last - first;
            if self.timestamps.len() > 1 && elapsed > 0.0 {
                self.fps = (self.timestamps.len() - 1) as f64 / elapsed * 1000.0;
            }
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

// -----------------------------------------------------------------------------
// GAZE STREAM SESSION
// -----------------------------------------------------------------------------

/// Owns the live connection and the exposed gaze state.
///
/// All mutation happens through `&mut self` on the thread driving
/// [`GazeStreamSession::poll`]; consumers read through `&self`.
pub struct GazeStreamSession {
    transport: Box<dyn GazeTransport>,
    state: ConnectionState,
    error: Option<SessionError>,
    mapper: CoordinateMapper,
    calibration: Option<CalibrationCoefficients>,
    gaze_point: Option<MappedPoint>,
    tracking_data: Option<Value>,
    frozen: Option<FrozenSnapshot>,
    message_count: u64,
    fps: FpsCounter,
    observers: Vec<Box<dyn GazeObserver>>,
    epoch: Instant,
}

impl GazeStreamSession {
    pub fn new(transport: Box<dyn GazeTransport>, mapper: CoordinateMapper) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            error: None,
            mapper,
            calibration: None,
            gaze_point: None,
            tracking_data: None,
            frozen: None,
            message_count: 0,
            fps: FpsCounter::new(FPS_WINDOW),
            observers: Vec::new(),
            epoch: Instant::now(),
        }
    }

    pub fn from_config(transport: Box<dyn GazeTransport>, config: &Config) -> Self {
        Self::new(transport, config.mapping.mapper())
    }

    pub fn add_observer(&mut self, observer: Box<dyn GazeObserver>) {
        self.observers.push(observer);
    }

    // CONNECTION --------------------------------------------------------------

    pub fn connect(&mut self) {
        if self.is_connected() {
            return;
        }

        self.state = ConnectionState::Connecting;
        match self.transport.open() {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.error = None;
                info!("Gaze stream connected");
            }
            Err(e) => {
                warn!("Gaze stream connection failed: {}", e);
                self.state = ConnectionState::Disconnected;
                self.error = Some(SessionError::Connection(e.to_string()));
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.transport.is_open() {
            self.transport.close();
        }
        if self.state != ConnectionState::Disconnected {
            info!("Gaze stream disconnected");
        }
        self.state = ConnectionState::Disconnected;
        self.gaze_point = None;
        self.tracking_data = None;
        self.frozen = None;
    }

    pub fn toggle_connection(&mut self) {
        if self.is_connected() {
            self.disconnect();
        } else {
            self.connect();
        }
    }

    // FREEZE ------------------------------------------------------------------

    /// Connected -> Frozen snapshots the current point and record;
    /// Frozen -> Connected drops the snapshot. Anything else is a no-op.
    pub fn toggle_freeze(&mut self) {
        match self.state {
            ConnectionState::Frozen => {
                self.frozen = None;
                self.state = ConnectionState::Connected;
                debug!("Gaze stream unfrozen");
            }
            ConnectionState::Connected => {
                if let (Some(gaze_point), Some(tracking_data)) =
                    (self.gaze_point, self.tracking_data.as_ref())
                {
                    self.frozen = Some(FrozenSnapshot {
                        gaze_point,
                        tracking_data: tracking_data.clone(),
                    });
                    self.state = ConnectionState::Frozen;
                    debug!("Gaze stream frozen at ({:.1}, {:.1})", gaze_point.x, gaze_point.y);
                }
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {}
        }
    }

    // INBOUND -----------------------------------------------------------------

    /// Handles one transport event. Returns `false` when nothing was pending.
    pub fn poll(&mut self) -> bool {
        match self.transport.poll() {
            TransportEvent::Message(raw) => {
                self.handle_message(&raw);
                true
            }
            TransportEvent::Idle => false,
            TransportEvent::Closed => {
                info!("Gaze stream closed by peer");
                self.on_transport_closed();
                true
            }
            TransportEvent::Error(reason) => {
                warn!("Gaze stream transport error: {}", reason);
                self.on_transport_closed();
                self.error = Some(SessionError::Connection(reason));
                true
            }
        }
    }

    /// Polls until the transport has nothing pending or the session drops.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while self.is_connected() && self.poll() {
            handled += 1;
        }
        handled
    }

    pub fn handle_message(&mut self, raw: &str) {
        let now = self.epoch.elapsed().as_secs_f64() * 1000.0;
        self.handle_message_at(raw, now);
    }

    /// Processes one raw message that arrived at `timestamp_ms`.
    pub fn handle_message_at(&mut self, raw: &str, timestamp_ms: f64) {
        if !self.is_connected() {
            return;
        }

        let data: Value = match serde_json::from_str(raw) {
            Ok(data) => data,
            Err(e) => {
                warn!("Error parsing gaze message: {}", e);
                self.error = Some(SessionError::InvalidMessage);
                return;
            }
        };
        let message: RawGazeMessage = match serde_json::from_value(data.clone()) {
            Ok(message) => message,
            Err(e) => {
                warn!("Gaze message has unexpected shape: {}", e);
                self.error = Some(SessionError::InvalidMessage);
                return;
            }
        };

        if self.state == ConnectionState::Frozen {
            return;
        }

        let Some(sample) = GazeSample::from_message(&message) else {
            debug!("Skipping gaze message without usable coordinates");
            return;
        };

        let point = self.mapper.map(&sample);
        for observer in self.observers.iter_mut() {
            observer.on_tracking_data_update(&data);
            observer.on_gaze_update(point, &sample);
        }

        self.tracking_data = Some(data);
        self.gaze_point = Some(point);
        self.message_count += 1;
        self.fps.push(timestamp_ms);
    }

    fn on_transport_closed(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.gaze_point = None;
        self.frozen = None;
    }

    // CONFIGURATION -----------------------------------------------------------

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut CoordinateMapper {
        &mut self.mapper
    }

    /// Refreshes window offset and display scale from the host shell. A
    /// missing or non-positive scale counts as 1.0.
    pub fn update_window_position(&mut self, provider: &dyn WindowGeometryProvider) {
        match provider.window_position() {
            Some(position) => self.mapper.geometry.offset = position,
            None => debug!("Window position unavailable, keeping previous offset"),
        }
        self.mapper.scale.scale_factor = provider
            .display_scale_factor()
            .filter(|s| *s > 0.0)
            .unwrap_or(1.0);
    }

    pub fn update_header_height(&mut self, header_height: f64) {
        self.mapper.geometry.header_height = header_height;
    }

    /// Replaces the active calibration wholesale.
    pub fn set_calibration(&mut self, calibration: Option<CalibrationCoefficients>) {
        self.calibration = calibration;
    }

    pub fn calibration(&self) -> Option<&CalibrationCoefficients> {
        self.calibration.as_ref()
    }

    // READ-OUT ----------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transport is up, frozen or not.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Frozen
        )
    }

    pub fn is_frozen(&self) -> bool {
        self.state == ConnectionState::Frozen
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    /// Frozen snapshot while frozen, otherwise the live point.
    pub fn current_gaze_point(&self) -> Option<MappedPoint> {
        match &self.frozen {
            Some(snapshot) => Some(snapshot.gaze_point),
            None => self.gaze_point,
        }
    }

    pub fn current_tracking_data(&self) -> Option<&Value> {
        match &self.frozen {
            Some(snapshot) => Some(&snapshot.tracking_data),
            None => self.tracking_data.as_ref(),
        }
    }

    /// Current point with the active calibration applied.
    pub fn calibrated_gaze_point(&self) -> Option<Point> {
        self.current_gaze_point()
            .map(|p| calibration::apply(p, self.calibration.as_ref()))
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn fps(&self) -> f64 {
        self.fps.fps()
    }
}

// -----------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------
