//! Risk heatmap overlay.
//!
//! Each zone is filled with the color of its risk level on a copy of the
//! frame, then the copy is alpha-blended over the original. Zones missing from
//! the risk map are filled white. Malformed rectangles are skipped.

use image::{Rgb, RgbImage};

use crate::risk::{DecoratedDetection, RiskLevel, RiskMap};
use crate::zone::{PixelPoint, ZoneLayout, ZoneRect};

pub const DEFAULT_OPACITY: f32 = 0.6;

pub const LOW_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
pub const MEDIUM_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const HIGH_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const BOX_THICKNESS: i32 = 2;

pub fn color_for(level: RiskLevel) -> Rgb<u8> {
    match level {
        RiskLevel::Low => LOW_COLOR,
        RiskLevel::Medium => MEDIUM_COLOR,
        RiskLevel::High => HIGH_COLOR,
    }
}

#[derive(Clone, Copy, Debug)]
pub struct HeatmapRenderer {
    opacity: f32,
}

impl HeatmapRenderer {
    /// `opacity` is clamped to `[0, 1]`.
    pub fn new(opacity: f32) -> Self {
        let opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            DEFAULT_OPACITY
        };
        Self { opacity }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Blend the zone overlay onto `base`, returning a new image.
    pub fn render(&self, base: &RgbImage, zones: &ZoneLayout, risk: &RiskMap) -> RgbImage {
        let mut overlay = base.clone();
        for (zone, rect) in zones.iter() {
            if !rect.is_well_formed() {
                log::warn!("heatmap: skipping malformed {} zone {:?}", zone, rect);
                continue;
            }
            let color = risk.get(zone).map(color_for).unwrap_or(UNKNOWN_COLOR);
            fill_rect(&mut overlay, rect, color);
        }
        blend(&overlay, base, self.opacity)
    }
}

impl Default for HeatmapRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_OPACITY)
    }
}

/// Outline every decorated detection.
pub fn draw_detections(image: &mut RgbImage, detections: &[DecoratedDetection]) {
    for decorated in detections {
        let bbox = &decorated.detection.bbox;
        draw_outline(image, bbox.top_left(), bbox.bottom_right(), BOX_COLOR);
    }
}

/// Fill a rectangle, corners inclusive, clipped to the image.
fn fill_rect(image: &mut RgbImage, rect: &ZoneRect, color: Rgb<u8>) {
    let Some((x0, y0, x1, y1)) = clip(image, rect.top_left, rect.bottom_right) else {
        return;
    };
    for y in y0..=y1 {
        for x in x0..=x1 {
            image.put_pixel(x, y, color);
        }
    }
}

fn draw_outline(image: &mut RgbImage, a: PixelPoint, b: PixelPoint, color: Rgb<u8>) {
    for t in 0..BOX_THICKNESS {
        let (down, up) = (a.y.saturating_add(t), b.y.saturating_sub(t));
        let (inward, back) = (a.x.saturating_add(t), b.x.saturating_sub(t));
        let top = ZoneRect::new(PixelPoint::new(a.x, down), PixelPoint::new(b.x, down));
        let bottom = ZoneRect::new(PixelPoint::new(a.x, up), PixelPoint::new(b.x, up));
        let left = ZoneRect::new(PixelPoint::new(inward, a.y), PixelPoint::new(inward, b.y));
        let right = ZoneRect::new(PixelPoint::new(back, a.y), PixelPoint::new(back, b.y));
        for edge in [top, bottom, left, right] {
            fill_rect(image, &edge, color);
        }
    }
}

fn clip(image: &RgbImage, a: PixelPoint, b: PixelPoint) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    if w == 0 || h == 0 {
        return None;
    }
    let x0 = (a.x as i64).max(0);
    let y0 = (a.y as i64).max(0);
    let x1 = (b.x as i64).min(w - 1);
    let y1 = (b.y as i64).min(h - 1);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

/// `overlay * alpha + base * (1 - alpha)`, rounded and saturated.
fn blend(overlay: &RgbImage, base: &RgbImage, alpha: f32) -> RgbImage {
    let beta = 1.0 - alpha;
    let mut out = RgbImage::new(base.width(), base.height());
    for ((dst, o), b) in out.pixels_mut().zip(overlay.pixels()).zip(base.pixels()) {
        for c in 0..3 {
            let value = o[c] as f32 * alpha + b[c] as f32 * beta;
            dst[c] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
