use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::statistics::Point;

// -----------------------------------------------------------------------------
// INBOUND SAMPLE
// -----------------------------------------------------------------------------

/// Wire shape of one tracker message. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGazeMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Coordinates as reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleCoords {
    /// Absolute screen pixels.
    Pixel { x: f64, y: f64 },
    /// Fractions of the reported screen size.
    Normalized { x: f64, y: f64 },
}

/// A usable tracker sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeSample {
    pub coords: SampleCoords,
    pub screen_width: Option<f64>,
    pub screen_height: Option<f64>,
}

impl GazeSample {
    /// Pixel fields win over normalized ones. Normalized coordinates need a
    /// non-zero screen size. Anything else is not a usable sample.
    pub fn from_message(message: &RawGazeMessage) -> Option<Self> {
        let screen_width = message.screen_width;
        let screen_height = message.screen_height;

        let coords = match (message.pixel_x, message.pixel_y) {
            (Some(x), Some(y)) => SampleCoords::Pixel { x, y },
            _ => match (message.x, message.y, screen_width, screen_height) {
                (Some(x), Some(y), Some(w), Some(h)) if w != 0.0 && h != 0.0 => {
                    SampleCoords::Normalized { x, y }
                }
                _ => return None,
            },
        };

        Some(Self {
            coords,
            screen_width,
            screen_height,
        })
    }

    /// Position in device screen pixels.
    pub fn screen_point(&self) -> Point {
        match self.coords {
            SampleCoords::Pixel { x, y } => Point { x, y },
            SampleCoords::Normalized { x, y } => Point {
                x: x * self.screen_width.unwrap_or(0.0),
                y: y * self.screen_height.unwrap_or(0.0),
            },
        }
    }
}

// -----------------------------------------------------------------------------
// CONFIGURATION TYPES
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    #[default]
    Divide,
    Multiply,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub scale_factor: f64,
    pub manual_scale_factor: Option<f64>,
    pub apply_scaling: bool,
    pub scale_mode: ScaleMode,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            manual_scale_factor: None,
            apply_scaling: true,
            scale_mode: ScaleMode::Divide,
        }
    }
}

impl ScaleConfig {
    /// Manual override when positive, else the discovered factor, else 1.0.
    pub fn effective_scale_factor(&self) -> f64 {
        match self.manual_scale_factor {
            Some(m) if m > 0.0 => m,
            _ if self.scale_factor > 0.0 => self.scale_factor,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowGeometry {
    /// Window top-left in screen pixels.
    pub offset: Point,
    pub manual_offset: Point,
    pub header_height: f64,
    pub manual_header_height: Option<f64>,
    /// Viewport size used for clamping.
    pub width: f64,
    pub height: f64,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            offset: Point::ZERO,
            manual_offset: Point::ZERO,
            header_height: 80.0,
            manual_header_height: None,
            width: 1280.0,
            height: 800.0,
        }
    }
}

impl WindowGeometry {
    pub fn total_offset(&self) -> Point {
        Point {
            x: self.offset.x + self.manual_offset.x,
            y: self.offset.y + self.manual_offset.y,
        }
    }

    fn manual_header_override(&self) -> Option<f64> {
        self.manual_header_height.filter(|h| *h > 0.0)
    }

    /// Unset and zero both mean "measure the header".
    fn header_is_measured(&self) -> bool {
        self.manual_header_height.map_or(true, |h| h == 0.0)
    }
}

// -----------------------------------------------------------------------------
// MAPPER
// -----------------------------------------------------------------------------

/// Window-local gaze position.
pub type MappedPoint = Point;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoordinateMapper {
    pub geometry: WindowGeometry,
    pub scale: ScaleConfig,
    pub invert_y: bool,
}

impl CoordinateMapper {
    pub fn new(geometry: WindowGeometry, scale: ScaleConfig, invert_y: bool) -> Self {
        Self {
            geometry,
            scale,
            invert_y,
        }
    }

    /// Header height subtracted from Y and from the clamp range.
    ///
    /// A positive manual value wins. When the header is measured, divide-mode
    /// scaling multiplies it by the square of the effective scale factor; any
    /// other manual value leaves the measured header unscaled.
    pub fn effective_header_height(&self) -> f64 {
        if let Some(h) = self.geometry.manual_header_override() {
            return h;
        }
        let measured = self.geometry.header_height;
        if self.geometry.header_is_measured()
            && self.scale.apply_scaling
            && self.scale.scale_mode == ScaleMode::Divide
        {
            let factor = self.scale.effective_scale_factor();
            measured * factor * factor
        } else {
            measured
        }
    }

    /// Maps a sample into window coordinates before clamping.
    pub fn map_unclamped(&self, sample: &GazeSample) -> Point {
        let screen = sample.screen_point();
        let factor = self.scale.effective_scale_factor();

        let logical = if self.scale.apply_scaling {
            match self.scale.scale_mode {
                ScaleMode::Divide => Point::new(screen.x / factor, screen.y / factor),
                ScaleMode::Multiply => Point::new(screen.x * factor, screen.y * factor),
                ScaleMode::None => screen,
            }
        } else {
            screen
        };

        let offset = self.geometry.total_offset();

        let mut y = logical.y;
        if self.invert_y {
            if let Some(screen_height) = sample.screen_height.filter(|h| *h != 0.0) {
                // Configured factor, not the manual override.
                let configured = self.scale.scale_factor;
                let screen_height_logical =
                    if self.scale.apply_scaling && configured != 1.0 && configured > 0.0 {
                        screen_height / configured
                    } else {
                        screen_height
                    };
                y = screen_height_logical - y;
            }
        }

        let header = self.effective_header_height();
        Point {
            x: logical.x - offset.x,
            y: y - offset.y - header,
        }
    }

    /// Maps a sample and clamps it to `[0, width] x [0, height - header]`.
    pub fn map(&self, sample: &GazeSample) -> MappedPoint {
        let raw = self.map_unclamped(sample);
        self.clamp(raw)
    }

    pub fn clamp(&self, point: Point) -> MappedPoint {
        let max_y = self.geometry.height - self.effective_header_height();
        Point {
            x: point.x.min(self.geometry.width).max(0.0),
            y: point.y.min(max_y).max(0.0),
        }
    }
}

// -----------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pixel(x: f64, y: f64) -> GazeSample {
        GazeSample {
            coords: SampleCoords::Pixel { x, y },
            screen_width: Some(1920.0),
            screen_height: Some(1080.0),
        }
    }

    fn flat_geometry(width: f64, height: f64) -> WindowGeometry {
        WindowGeometry {
            header_height: 0.0,
            width,
            height,
            ..Default::default()
        }
    }

    fn message(value: serde_json::Value) -> RawGazeMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_sample_prefers_pixel_fields() {
        let m = message(json!({
            "pixelX": 10.0, "pixelY": 20.0, "x": 0.5, "y": 0.5,
            "screenWidth": 1920, "screenHeight": 1080
        }));
        let s = GazeSample::from_message(&m).unwrap();
        assert_eq!(s.coords, SampleCoords::Pixel { x: 10.0, y: 20.0 });
        assert_eq!(s.screen_point(), Point::new(10.0, 20.0));
    }

    #[test]
    fn test_sample_normalized_uses_screen_size() {
        let m = message(json!({ "x": 0.25, "y": 0.5, "screenWidth": 1920, "screenHeight": 1080 }));
        let s = GazeSample::from_message(&m).unwrap();
        assert_eq!(s.screen_point(), Point::new(480.0, 540.0));
    }

    #[test]
    fn test_sample_unusable() {
        assert!(GazeSample::from_message(&message(json!({ "pixelX": 4.0 }))).is_none());
        assert!(GazeSample::from_message(&message(json!({ "x": 0.1, "y": 0.2 }))).is_none());
        assert!(GazeSample::from_message(&message(
            json!({ "x": 0.1, "y": 0.2, "screenWidth": 0, "screenHeight": 1080 })
        ))
        .is_none());
        assert!(GazeSample::from_message(&message(json!({ "confidence": 0.9 }))).is_none());
    }

    #[test]
    fn test_passthrough_fields_kept() {
        let m = message(json!({ "pixelX": 1.0, "pixelY": 2.0, "leftPupil": 3.1 }));
        assert_eq!(m.extra.get("leftPupil"), Some(&json!(3.1)));
    }

    #[test]
    fn test_divide_scaling() {
        let scale = ScaleConfig {
            scale_factor: 2.0,
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(flat_geometry(800.0, 600.0), scale, false);
        assert_eq!(mapper.map_unclamped(&pixel(200.0, 100.0)), Point::new(100.0, 50.0));
        assert_eq!(mapper.map(&pixel(200.0, 100.0)), Point::new(100.0, 50.0));
    }

    #[test]
    fn test_multiply_and_none_modes() {
        let mut scale = ScaleConfig {
            scale_factor: 2.0,
            scale_mode: ScaleMode::Multiply,
            ..Default::default()
        };
        let geometry = flat_geometry(5000.0, 5000.0);
        let mapper = CoordinateMapper::new(geometry, scale, false);
        assert_eq!(mapper.map(&pixel(200.0, 100.0)), Point::new(400.0, 200.0));

        scale.scale_mode = ScaleMode::None;
        let mapper = CoordinateMapper::new(geometry, scale, false);
        assert_eq!(mapper.map(&pixel(200.0, 100.0)), Point::new(200.0, 100.0));

        scale.scale_mode = ScaleMode::Divide;
        scale.apply_scaling = false;
        let mapper = CoordinateMapper::new(geometry, scale, false);
        assert_eq!(mapper.map(&pixel(200.0, 100.0)), Point::new(200.0, 100.0));
    }

    #[test]
    fn test_manual_scale_override() {
        let scale = ScaleConfig {
            scale_factor: 2.0,
            manual_scale_factor: Some(4.0),
            ..Default::default()
        };
        assert_eq!(scale.effective_scale_factor(), 4.0);

        let ignored = ScaleConfig {
            scale_factor: 2.0,
            manual_scale_factor: Some(0.0),
            ..Default::default()
        };
        assert_eq!(ignored.effective_scale_factor(), 2.0);

        let broken = ScaleConfig {
            scale_factor: -1.0,
            manual_scale_factor: None,
            ..Default::default()
        };
        assert_eq!(broken.effective_scale_factor(), 1.0);
    }

    #[test]
    fn test_offsets_are_summed() {
        let geometry = WindowGeometry {
            offset: Point::new(100.0, 50.0),
            manual_offset: Point::new(-10.0, 5.0),
            ..flat_geometry(800.0, 600.0)
        };
        let scale = ScaleConfig {
            apply_scaling: false,
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(geometry, scale, false);
        assert_eq!(mapper.map(&pixel(300.0, 300.0)), Point::new(210.0, 245.0));
    }

    #[test]
    fn test_clamping() {
        let scale = ScaleConfig {
            scale_mode: ScaleMode::None,
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(flat_geometry(800.0, 600.0), scale, false);
        assert_eq!(mapper.map_unclamped(&pixel(-50.0, 900.0)), Point::new(-50.0, 900.0));
        assert_eq!(mapper.map(&pixel(-50.0, 900.0)), Point::new(0.0, 600.0));
        assert_eq!(mapper.map(&pixel(1200.0, -3.0)), Point::new(800.0, 0.0));
    }

    #[test]
    fn test_clamp_with_header_taller_than_window() {
        let geometry = WindowGeometry {
            header_height: 700.0,
            ..flat_geometry(800.0, 600.0)
        };
        let scale = ScaleConfig {
            apply_scaling: false,
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(geometry, scale, false);
        let p = mapper.map(&pixel(10.0, 1000.0));
        assert_eq!(p, Point::new(10.0, 0.0));
    }

    #[test]
    fn test_y_inversion_uses_configured_factor() {
        let scale = ScaleConfig {
            scale_factor: 2.0,
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(flat_geometry(2000.0, 2000.0), scale, true);
        // 1080 / 2 - 100 / 2
        assert_eq!(mapper.map(&pixel(0.0, 100.0)).y, 540.0 - 50.0);

        let scale = ScaleConfig {
            scale_factor: 1.0,
            manual_scale_factor: Some(2.0),
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(flat_geometry(2000.0, 2000.0), scale, true);
        // Screen height is not divided because the configured factor is 1.0.
        assert_eq!(mapper.map(&pixel(0.0, 100.0)).y, 1080.0 - 50.0);
    }

    #[test]
    fn test_y_inversion_needs_screen_height() {
        let scale = ScaleConfig {
            apply_scaling: false,
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(flat_geometry(2000.0, 2000.0), scale, true);
        let sample = GazeSample {
            coords: SampleCoords::Pixel { x: 0.0, y: 100.0 },
            screen_width: None,
            screen_height: None,
        };
        assert_eq!(mapper.map(&sample).y, 100.0);
    }

    // Pinned: divide-mode header correction is quadratic in the scale factor.
    #[test]
    fn test_header_quadratic_correction_pinned() {
        let geometry = WindowGeometry {
            header_height: 40.0,
            ..flat_geometry(2000.0, 2000.0)
        };
        let scale = ScaleConfig {
            scale_factor: 1.5,
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(geometry, scale, false);
        assert_eq!(mapper.effective_header_height(), 40.0 * 1.5 * 1.5);
        assert_eq!(mapper.map(&pixel(0.0, 300.0)).y, 200.0 - 90.0);
    }

    #[test]
    fn test_header_manual_override_skips_correction() {
        let geometry = WindowGeometry {
            header_height: 40.0,
            manual_header_height: Some(25.0),
            ..flat_geometry(2000.0, 2000.0)
        };
        let scale = ScaleConfig {
            scale_factor: 2.0,
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(geometry, scale, false);
        assert_eq!(mapper.effective_header_height(), 25.0);
    }

    #[test]
    fn test_header_negative_manual_uses_measured_unscaled() {
        let scale = ScaleConfig {
            scale_factor: 2.0,
            ..Default::default()
        };
        let negative = WindowGeometry {
            header_height: 40.0,
            manual_header_height: Some(-5.0),
            ..flat_geometry(2000.0, 2000.0)
        };
        let mapper = CoordinateMapper::new(negative, scale, false);
        assert_eq!(mapper.effective_header_height(), 40.0);

        let zero = WindowGeometry {
            manual_header_height: Some(0.0),
            ..negative
        };
        let mapper = CoordinateMapper::new(zero, scale, false);
        assert_eq!(mapper.effective_header_height(), 160.0);
    }

    #[test]
    fn test_header_not_corrected_outside_divide_mode() {
        let geometry = WindowGeometry {
            header_height: 40.0,
            ..flat_geometry(2000.0, 2000.0)
        };
        let scale = ScaleConfig {
            scale_factor: 2.0,
            scale_mode: ScaleMode::Multiply,
            ..Default::default()
        };
        let mapper = CoordinateMapper::new(geometry, scale, false);
        assert_eq!(mapper.effective_header_height(), 40.0);
    }
}
