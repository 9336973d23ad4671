use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::statistics::{geometric_median_with, AggregationPoint, Point};

pub const CALIBRATION_VERSION: &str = "1.0";

// -----------------------------------------------------------------------------
// AFFINE MODEL
// -----------------------------------------------------------------------------

/// Affine correction `X = a0 + a1*x + a2*y`, `Y = b0 + b1*x + b2*y`.
///
/// All six terms are required when deserializing, so a partial set never
/// produces a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCoefficients {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
}

impl CalibrationCoefficients {
    pub const IDENTITY: CalibrationCoefficients = CalibrationCoefficients {
        a0: 0.0,
        a1: 1.0,
        a2: 0.0,
        b0: 0.0,
        b1: 0.0,
        b2: 1.0,
    };

    pub fn transform(&self, point: Point) -> Point {
        Point {
            x: self.a0 + self.a1 * point.x + self.a2 * point.y,
            y: self.b0 + self.b1 * point.x + self.b2 * point.y,
        }
    }
}

/// Applies `coefficients` to `point`, or returns `point` unchanged when there
/// is no calibration. NaN inputs come out as NaN.
pub fn apply(point: Point, coefficients: Option<&CalibrationCoefficients>) -> Point {
    match coefficients {
        Some(c) => c.transform(point),
        None => point,
    }
}

// -----------------------------------------------------------------------------
// CALIBRATION BLOB PARSING
// -----------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("calibration blob is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("calibration blob has unexpected type: {0}")]
    UnexpectedType(&'static str),
}

/// Pulls the affine coefficients out of a user record's `calibration` field.
///
/// The field may hold the JSON text of a [`CalibrationRecord`] or the record
/// itself. `Ok(None)` means the user has no calibration or the record carries
/// no complete coefficient set.
pub fn try_parse_coefficients(
    user: &Value,
) -> Result<Option<CalibrationCoefficients>, CalibrationError> {
    let blob = match user.get("calibration") {
        None | Some(Value::Null) => return Ok(None),
        Some(blob) => blob,
    };

    let parsed;
    let record = match blob {
        Value::String(text) if text.is_empty() => return Ok(None),
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text)?;
            &parsed
        }
        Value::Object(_) => blob,
        _ => return Err(CalibrationError::UnexpectedType("expected string or object")),
    };

    Ok(record
        .get("affine_coefficients")
        .and_then(|c| serde_json::from_value::<CalibrationCoefficients>(c.clone()).ok()))
}

/// Like [`try_parse_coefficients`] but folds every failure into `None`,
/// logging it.
pub fn parse_coefficients(user: &Value) -> Option<CalibrationCoefficients> {
    match try_parse_coefficients(user) {
        Ok(coefficients) => coefficients,
        Err(e) => {
            warn!("Error parsing calibration data: {}", e);
            None
        }
    }
}

// -----------------------------------------------------------------------------
// CALIBRATION TARGETS
// -----------------------------------------------------------------------------

/// One raw sample captured while the user fixated a calibration target.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub x: Option<f64>,
    pub y: Option<f64>,
    #[serde(default)]
    pub screen_x: Option<f64>,
    #[serde(default)]
    pub screen_y: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationTarget {
    pub label: String,
    pub target: Point,
    pub samples: Vec<CalibrationSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPointResult {
    pub label: String,
    pub target: Point,
    pub average_gaze: Point,
    pub average_screen: Point,
    pub sample_count: usize,
    pub offset: Point,
}

/// Collapses the samples of one target to a single robust estimate. Returns
/// `None` when no sample has both gaze coordinates.
pub fn process_target(
    target: &CalibrationTarget,
    tolerance: f64,
    max_iterations: usize,
) -> Option<CalibrationPointResult> {
    let valid: Vec<&CalibrationSample> = target
        .samples
        .iter()
        .filter(|s| s.x.is_some() && s.y.is_some())
        .collect();

    if valid.is_empty() {
        debug!("Skipping calibration target '{}': no valid samples", target.label);
        return None;
    }

    let gaze: Vec<AggregationPoint> = valid
        .iter()
        .map(|s| AggregationPoint { x: s.x, y: s.y })
        .collect();
    let average_gaze = geometric_median_with(&gaze, tolerance, max_iterations);

    let screen: Vec<Point> = valid
        .iter()
        .filter_map(|s| match (s.screen_x, s.screen_y) {
            (Some(x), Some(y)) => Some(Point { x, y }),
            _ => None,
        })
        .collect();
    let average_screen = if screen.is_empty() {
        Point::ZERO
    } else {
        let n = screen.len() as f64;
        Point {
            x: screen.iter().map(|p| p.x).sum::<f64>() / n,
            y: screen.iter().map(|p| p.y).sum::<f64>() / n,
        }
    };

    Some(CalibrationPointResult {
        label: target.label.clone(),
        target: target.target,
        average_gaze,
        average_screen,
        sample_count: valid.len(),
        offset: Point {
            x: target.target.x - average_gaze.x,
            y: target.target.y - average_gaze.y,
        },
    })
}

/// Processes every target in parallel, keeping input order and dropping
/// targets without valid samples.
pub fn process_targets(
    targets: &[CalibrationTarget],
    tolerance: f64,
    max_iterations: usize,
) -> Vec<CalibrationPointResult> {
    targets
        .par_iter()
        .filter_map(|t| process_target(t, tolerance, max_iterations))
        .collect()
}

// -----------------------------------------------------------------------------
// CALIBRATION RECORD
// -----------------------------------------------------------------------------

/// The stored per-user calibration blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub timestamp: i64,
    pub points: Vec<CalibrationPointResult>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affine_coefficients: Option<CalibrationCoefficients>,
}

impl CalibrationRecord {
    /// Builds a record from raw targets. Coefficients are fitted elsewhere
    /// and attached with [`CalibrationRecord::with_coefficients`].
    pub fn from_targets(
        targets: &[CalibrationTarget],
        timestamp: i64,
        tolerance: f64,
        max_iterations: usize,
    ) -> Self {
        Self {
            timestamp,
            points: process_targets(targets, tolerance, max_iterations),
            version: CALIBRATION_VERSION.to_string(),
            affine_coefficients: None,
        }
    }

    pub fn with_coefficients(mut self, coefficients: CalibrationCoefficients) -> Self {
        self.affine_coefficients = Some(coefficients);
        self
    }

    /// Pretty JSON text, the form kept in a user's `calibration` field.
    pub fn to_blob(&self) -> Result<String, CalibrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// -----------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------
