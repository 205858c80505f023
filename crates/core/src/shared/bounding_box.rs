use serde::{Deserialize, Serialize};

/// Axis-aligned box in normalized frame coordinates (fractions of 0.0-1.0).
///
/// `x`/`y` are the top-left corner. Zero-width or zero-height boxes are
/// legal and overlap nothing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    /// Intersection-over-union with `other`, always in `[0, 1]`.
    ///
    /// Returns 0 when either box has non-positive area, when the boxes are
    /// disjoint, or when any coordinate or intermediate is non-finite.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        if !self.is_finite() || !other.is_finite() {
            return 0.0;
        }
        let area_a = self.area();
        let area_b = other.area();
        if !(area_a > 0.0 && area_b > 0.0) {
            return 0.0;
        }

        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }

        let iou = inter / (area_a + area_b - inter);
        if iou.is_finite() {
            iou.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// True when both dimensions strictly exceed `min_fraction` of the frame.
    pub fn exceeds(&self, min_fraction: f64) -> bool {
        self.width > min_fraction && self.height > min_fraction
    }
}
