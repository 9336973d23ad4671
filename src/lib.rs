pub mod bindings;
pub mod config;
pub mod error;
pub mod local;
pub mod processing;
pub mod utils;

pub use processing::calibration::{apply, parse_coefficients, CalibrationCoefficients};
pub use processing::mapper::{
    CoordinateMapper, GazeSample, MappedPoint, ScaleConfig, ScaleMode, WindowGeometry,
};
pub use processing::session::{ConnectionState, GazeStreamSession, SessionError};
pub use processing::statistics::{
    coordinate_wise_median, geometric_median, median, AggregationPoint, Point,
};
