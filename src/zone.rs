//! Spatial risk zones.
//!
//! The frame is split into three named regions. The rectangles overlap on
//! their shared edges; the classification rule, not the geometry, decides
//! which zone owns a point:
//!
//! 1. `center` when strictly inside the center rectangle on both axes,
//! 2. otherwise `left` when left of the center rectangle's left edge,
//! 3. otherwise `right`.

use serde::Serialize;
use std::fmt;

const CENTER_MIN_FRACTION: f64 = 0.3;
const CENTER_MAX_FRACTION: f64 = 0.7;

/// A point in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneId {
    Center,
    Left,
    Right,
}

impl ZoneId {
    pub const ALL: [ZoneId; 3] = [ZoneId::Center, ZoneId::Left, ZoneId::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            ZoneId::Center => "center",
            ZoneId::Left => "left",
            ZoneId::Right => "right",
        }
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned rectangle given by its top-left and bottom-right corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ZoneRect {
    pub top_left: PixelPoint,
    pub bottom_right: PixelPoint,
}

impl ZoneRect {
    pub const fn new(top_left: PixelPoint, bottom_right: PixelPoint) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    /// Strict containment: points on any edge are outside.
    pub fn contains_strict(&self, p: PixelPoint) -> bool {
        self.top_left.x < p.x
            && p.x < self.bottom_right.x
            && self.top_left.y < p.y
            && p.y < self.bottom_right.y
    }

    /// A rectangle whose corners are ordered and non-negative.
    pub fn is_well_formed(&self) -> bool {
        self.top_left.x >= 0
            && self.top_left.y >= 0
            && self.top_left.x <= self.bottom_right.x
            && self.top_left.y <= self.bottom_right.y
    }
}

/// A detection box in pixel space, stored as center and size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PixelBox {
    pub center: PixelPoint,
    pub width: i32,
    pub height: i32,
}

impl PixelBox {
    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Corners saturate at the `i32` range.
    pub fn top_left(&self) -> PixelPoint {
        PixelPoint::new(
            self.center.x.saturating_sub(self.width / 2),
            self.center.y.saturating_sub(self.height / 2),
        )
    }

    pub fn bottom_right(&self) -> PixelPoint {
        PixelPoint::new(
            self.center.x.saturating_add(self.width / 2),
            self.center.y.saturating_add(self.height / 2),
        )
    }

    /// Intersection over union with another box, in `[0, 1]`.
    pub fn iou(&self, other: &PixelBox) -> f64 {
        let (a0, a1) = (self.top_left(), self.bottom_right());
        let (b0, b1) = (other.top_left(), other.bottom_right());
        let span = |lo: i32, hi: i32| (hi as i64 - lo as i64).max(0) as f64;
        let iw = span(a0.x.max(b0.x), a1.x.min(b1.x));
        let ih = span(a0.y.max(b0.y), a1.y.min(b1.y));
        let inter = iw * ih;
        let area_a = span(a0.x, a1.x) * span(a0.y, a1.y);
        let area_b = span(b0.x, b1.x) * span(b0.y, b1.y);
        let union = area_a + area_b - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// The three zones for one frame size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ZoneLayout {
    pub center: ZoneRect,
    pub left: ZoneRect,
    pub right: ZoneRect,
}

impl ZoneLayout {
    /// Build the layout for a `width` x `height` frame.
    ///
    /// Fractional corners are truncated toward zero.
    pub fn for_frame(width: u32, height: u32) -> Self {
        let w = width as f64;
        let h = height as f64;
        let x0 = (w * CENTER_MIN_FRACTION) as i32;
        let x1 = (w * CENTER_MAX_FRACTION) as i32;
        let y0 = (h * CENTER_MIN_FRACTION) as i32;
        let y1 = (h * CENTER_MAX_FRACTION) as i32;
        let width = width as i32;
        let height = height as i32;

        Self {
            center: ZoneRect::new(PixelPoint::new(x0, y0), PixelPoint::new(x1, y1)),
            left: ZoneRect::new(PixelPoint::new(0, 0), PixelPoint::new(x0, height)),
            right: ZoneRect::new(PixelPoint::new(x1, 0), PixelPoint::new(width, height)),
        }
    }

    pub fn get(&self, zone: ZoneId) -> &ZoneRect {
        match zone {
            ZoneId::Center => &self.center,
            ZoneId::Left => &self.left,
            ZoneId::Right => &self.right,
        }
    }

    /// Zones in drawing order.
    pub fn iter(&self) -> impl Iterator<Item = (ZoneId, &ZoneRect)> + '_ {
        ZoneId::ALL.into_iter().map(move |zone| (zone, self.get(zone)))
    }

    /// Assign a point to exactly one zone.
    pub fn classify(&self, p: PixelPoint) -> ZoneId {
        if self.center.contains_strict(p) {
            ZoneId::Center
        } else if p.x < self.center.top_left.x {
            ZoneId::Left
        } else {
            ZoneId::Right
        }
    }
}
