//! Bounding box value types.
//!
//! - `NormalizedBox`: detector output, fractions of the cropped frame size.
//! - `PixelBox`: the same box projected into grid image pixels.

use serde::{Deserialize, Serialize};

use crate::error::LocateError;

/// Axis-aligned box in normalized `[0, 1]` coordinates.
///
/// Values outside `[0, 1]` are representable; projection clamps them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct NormalizedBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl NormalizedBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Build from `[xmin, ymin, xmax, ymax]`. Any other length is rejected.
    pub fn from_slice(values: &[f64]) -> Result<Self, LocateError> {
        match values {
            [xmin, ymin, xmax, ymax] => Ok(Self::new(*xmin, *ymin, *xmax, *ymax)),
            _ => Err(LocateError::InvalidBoundingBox(format!(
                "expected 4 coordinates, got {}",
                values.len()
            ))),
        }
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl From<[f64; 4]> for NormalizedBox {
    fn from(values: [f64; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }
}

impl From<NormalizedBox> for [f64; 4] {
    fn from(bbox: NormalizedBox) -> Self {
        bbox.to_array()
    }
}

/// Axis-aligned box in integer pixel coordinates of the projected grid image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
}

impl PixelBox {
    pub fn new(xmin: u32, ymin: u32, xmax: u32, ymax: u32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Box center in pixel space.
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.xmin as f64 + self.xmax as f64) / 2.0,
            (self.ymin as f64 + self.ymax as f64) / 2.0,
        )
    }

    /// True when either range is inverted. Zero-width or zero-height is fine.
    pub fn is_inverted(&self) -> bool {
        self.xmin > self.xmax || self.ymin > self.ymax
    }

    /// Clamp every coordinate to `[0, width] x [0, height]`.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        Self {
            xmin: self.xmin.min(width),
            ymin: self.ymin.min(height),
            xmax: self.xmax.min(width),
            ymax: self.ymax.min(height),
        }
    }

    pub fn to_array(self) -> [u32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_requires_four_values() {
        assert!(NormalizedBox::from_slice(&[0.1, 0.2, 0.3]).is_err());
        let bbox = NormalizedBox::from_slice(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(bbox.to_array(), [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn serializes_as_flat_array() {
        let bbox = NormalizedBox::new(0.83, 0.69, 1.0, 0.99);
        let json = serde_json::to_string(&bbox).unwrap();
        assert_eq!(json, "[0.83,0.69,1.0,0.99]");
        let back: NormalizedBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bbox);
    }

    #[test]
    fn non_finite_detected() {
        assert!(!NormalizedBox::new(f64::NAN, 0.0, 1.0, 1.0).is_finite());
        assert!(NormalizedBox::new(-0.5, 0.0, 1.5, 1.0).is_finite());
    }

    #[test]
    fn pixel_centroid_and_inversion() {
        let bbox = PixelBox::new(506, 407, 610, 584);
        assert_eq!(bbox.centroid(), (558.0, 495.5));
        assert!(!bbox.is_inverted());
        assert!(PixelBox::new(20, 0, 10, 5).is_inverted());
        assert!(!PixelBox::new(10, 5, 10, 5).is_inverted());
    }
}
