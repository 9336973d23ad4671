use crate::processing::calibration::{self, CalibrationCoefficients};
use crate::processing::statistics::{self, AggregationPoint, Point};

use pyo3::prelude::*;

fn to_points(points: Vec<(Option<f64>, Option<f64>)>) -> Vec<AggregationPoint> {
    points
        .into_iter()
        .map(|(x, y)| AggregationPoint { x, y })
        .collect()
}

#[pyfunction]
pub fn median(values: Vec<f64>) -> f64 {
    statistics::median(&values)
}

#[pyfunction]
pub fn coordinate_wise_median(points: Vec<(Option<f64>, Option<f64>)>) -> (f64, f64) {
    let p = statistics::coordinate_wise_median(&to_points(points));
    (p.x, p.y)
}

#[pyfunction]
#[pyo3(signature = (points, tolerance = 0.001, max_iterations = 100))]
pub fn geometric_median(
    points: Vec<(Option<f64>, Option<f64>)>,
    tolerance: f64,
    max_iterations: usize,
) -> (f64, f64) {
    let p = statistics::geometric_median_with(&to_points(points), tolerance, max_iterations);
    (p.x, p.y)
}

/// `coefficients` is `(a0, a1, a2, b0, b1, b2)` or `None` for no calibration.
#[pyfunction]
#[pyo3(signature = (x, y, coefficients = None))]
pub fn apply_calibration(
    x: f64,
    y: f64,
    coefficients: Option<(f64, f64, f64, f64, f64, f64)>,
) -> (f64, f64) {
    let coefficients = coefficients.map(|(a0, a1, a2, b0, b1, b2)| CalibrationCoefficients {
        a0,
        a1,
        a2,
        b0,
        b1,
        b2,
    });
    let p = calibration::apply(Point::new(x, y), coefficients.as_ref());
    (p.x, p.y)
}

/// A Python module implemented in Rust.
#[pymodule]
pub fn gaze_mapping(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(median, m)?)?;
    m.add_function(wrap_pyfunction!(coordinate_wise_median, m)?)?;
    m.add_function(wrap_pyfunction!(geometric_median, m)?)?;
    m.add_function(wrap_pyfunction!(apply_calibration, m)?)?;
    Ok(())
}
