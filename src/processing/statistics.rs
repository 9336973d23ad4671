use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// POINT TYPES
// -----------------------------------------------------------------------------

/// A fully specified 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A raw aggregation input. Either coordinate may be missing; such points are
/// filtered out before they reach any median.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregationPoint {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl AggregationPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
        }
    }

    /// Both coordinates present and finite.
    pub fn valid(&self) -> Option<Point> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Point { x, y }),
            _ => None,
        }
    }
}

impl From<Point> for AggregationPoint {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y)
    }
}

// -----------------------------------------------------------------------------
// MEDIANS
// -----------------------------------------------------------------------------

pub const DEFAULT_TOLERANCE: f64 = 0.001;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Median of `values`. Sorts a copy; an empty slice yields 0.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median of x and median of y, each taken over the points that carry a
/// finite value for that coordinate.
pub fn coordinate_wise_median(points: &[AggregationPoint]) -> Point {
    if points.is_empty() {
        return Point::ZERO;
    }

    let xs: Vec<f64> = points
        .iter()
        .filter_map(|p| p.x.filter(|v| v.is_finite()))
        .collect();
    let ys: Vec<f64> = points
        .iter()
        .filter_map(|p| p.y.filter(|v| v.is_finite()))
        .collect();

    Point {
        x: median(&xs),
        y: median(&ys),
    }
}

/// Geometric median with the default tolerance and iteration cap.
pub fn geometric_median(points: &[AggregationPoint]) -> Point {
    geometric_median_with(points, DEFAULT_TOLERANCE, DEFAULT_MAX_ITERATIONS)
}

/// Point minimising the summed Euclidean distance to `points`, found with
/// Weiszfeld's iteratively reweighted average.
///
/// Starts from the coordinate-wise median. Points within `tolerance` of the
/// current estimate contribute with unit weight instead of `1/d`. Returns the
/// last estimate if `max_iterations` runs out before the step size drops below
/// `tolerance`.
pub fn geometric_median_with(
    points: &[AggregationPoint],
    tolerance: f64,
    max_iterations: usize,
) -> Point {
    let valid: Vec<Point> = points.iter().filter_map(AggregationPoint::valid).collect();

    match valid.len() {
        0 => return Point::ZERO,
        1 => return valid[0],
        _ => {}
    }

    let seed: Vec<AggregationPoint> = valid.iter().copied().map(AggregationPoint::from).collect();
    let mut current = coordinate_wise_median(&seed);

    for _ in 0..max_iterations {
        let mut numerator_x = 0.0;
        let mut numerator_y = 0.0;
        let mut denominator = 0.0;

        for point in &valid {
            let distance = point.distance(&current);
            if distance > tolerance {
                let weight = 1.0 / distance;
                numerator_x += point.x * weight;
                numerator_y += point.y * weight;
                denominator += weight;
            } else {
                numerator_x += point.x;
                numerator_y += point.y;
                denominator += 1.0;
            }
        }

        if denominator == 0.0 {
            break;
        }

        let next = Point {
            x: numerator_x / denominator,
            y: numerator_y / denominator,
        };

        if next.distance(&current) < tolerance {
            return next;
        }

        current = next;
    }

    current
}

// -----------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------
