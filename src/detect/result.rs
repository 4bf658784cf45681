use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::vocab::ClassVocabulary;
use crate::zone::{PixelBox, PixelPoint};

/// Leading values of a raw row before the class scores:
/// `cx, cy, w, h, objectness`.
pub const RAW_ROW_PREFIX: usize = 5;

/// One raw detector row. Geometry is normalized to `0..1` of the frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    #[serde(default)]
    pub objectness: f32,
    /// Per-class scores, indexed by class id.
    pub scores: Vec<f32>,
}

impl RawDetection {
    /// Split a flat `[cx, cy, w, h, objectness, scores...]` row.
    pub fn from_row(row: &[f32]) -> Option<Self> {
        if row.len() <= RAW_ROW_PREFIX {
            return None;
        }
        Some(Self {
            cx: row[0],
            cy: row[1],
            w: row[2],
            h: row[3],
            objectness: row[4],
            scores: row[RAW_ROW_PREFIX..].to_vec(),
        })
    }

    /// Index and score of the best class. Ties resolve to the lowest index.
    pub fn best_class(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &score) in self.scores.iter().enumerate() {
            match best {
                Some((_, current)) if score <= current => {}
                _ => best = Some((i, score)),
            }
        }
        best
    }

    fn geometry_is_finite(&self) -> bool {
        [self.cx, self.cy, self.w, self.h].iter().all(|v| v.is_finite())
    }

    /// Center inside the frame and size no larger than the frame.
    fn geometry_is_normalized(&self) -> bool {
        [self.cx, self.cy, self.w, self.h]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

/// Everything the detector produced for one frame, grouped by output layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutput {
    pub layers: Vec<Vec<RawDetection>>,
}

impl DetectorOutput {
    pub fn single_layer(rows: Vec<RawDetection>) -> Self {
        Self { layers: vec![rows] }
    }

    /// Row count across all layers, before any confidence filtering.
    pub fn raw_count(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    /// Rows in layer order.
    pub fn iter(&self) -> impl Iterator<Item = &RawDetection> + '_ {
        self.layers.iter().flatten()
    }
}

/// A decoded detection in pixel space.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: PixelBox,
}

impl Detection {
    /// Decode a raw row for a `width` x `height` frame.
    ///
    /// Pixel values are truncated toward zero. Rows with non-finite numbers,
    /// geometry outside `0..=1`, no scores, or a class index outside the
    /// vocabulary are rejected.
    pub fn from_raw(
        raw: &RawDetection,
        vocab: &ClassVocabulary,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if !raw.geometry_is_finite() {
            return Err(anyhow!("non-finite box geometry"));
        }
        if !raw.geometry_is_normalized() {
            return Err(anyhow!(
                "box geometry outside normalized range: cx={} cy={} w={} h={}",
                raw.cx,
                raw.cy,
                raw.w,
                raw.h
            ));
        }
        let (class_id, confidence) = raw
            .best_class()
            .ok_or_else(|| anyhow!("row carries no class scores"))?;
        if !confidence.is_finite() || raw.scores.iter().any(|s| !s.is_finite()) {
            return Err(anyhow!("non-finite class score"));
        }
        let class_name = vocab
            .name(class_id)
            .ok_or_else(|| {
                anyhow!(
                    "class index {} outside vocabulary of {}",
                    class_id,
                    vocab.len()
                )
            })?
            .to_string();

        let w = width as f64;
        let h = height as f64;
        let bbox = PixelBox {
            center: PixelPoint::new(
                (raw.cx as f64 * w) as i32,
                (raw.cy as f64 * h) as i32,
            ),
            width: (raw.w as f64 * w) as i32,
            height: (raw.h as f64 * h) as i32,
        };

        Ok(Self {
            class_id,
            class_name,
            confidence,
            bbox,
        })
    }
}
