//! Per-frame risk evaluation.
//!
//! One call to `RiskEvaluator::evaluate` turns a frame's raw detector output
//! into a risk level per zone, an ordered list of warnings, and the decorated
//! detections used for drawing. Zone levels start at `low` every frame and are
//! only ever raised within it.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::detect::{Detection, DetectorOutput};
use crate::threshold::Thresholds;
use crate::tracker::{MotionDirection, PositionTracker};
use crate::vocab::ClassVocabulary;
use crate::zone::{ZoneId, ZoneLayout};

/// Detections at or below this confidence are dropped silently.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Classes eligible for critical escalation.
pub const HIGH_PRIORITY_CLASSES: [&str; 6] = ["person", "bicycle", "car", "motorbike", "bus", "truck"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// Risk level per zone for one frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RiskMap {
    levels: BTreeMap<ZoneId, RiskLevel>,
}

impl RiskMap {
    pub fn all_low() -> Self {
        Self {
            levels: ZoneId::ALL.iter().map(|&zone| (zone, RiskLevel::Low)).collect(),
        }
    }

    /// A map with no zone entries; renderers fall back to their default color.
    pub fn empty() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    pub fn get(&self, zone: ZoneId) -> Option<RiskLevel> {
        self.levels.get(&zone).copied()
    }

    /// Raise a zone to at least `level`; never lowers it. Returns the result.
    pub fn raise(&mut self, zone: ZoneId, level: RiskLevel) -> RiskLevel {
        let entry = self.levels.entry(zone).or_insert(RiskLevel::Low);
        if level > *entry {
            *entry = level;
        }
        *entry
    }

    pub fn iter(&self) -> impl Iterator<Item = (ZoneId, RiskLevel)> + '_ {
        self.levels.iter().map(|(zone, level)| (*zone, *level))
    }

    pub fn highest(&self) -> RiskLevel {
        self.levels.values().copied().max().unwrap_or(RiskLevel::Low)
    }
}

impl Default for RiskMap {
    fn default() -> Self {
        Self::all_low()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

/// A human-readable alert for one detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub severity: Severity,
    pub class_name: String,
    pub zone: ZoneId,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Critical => write!(
                f,
                "CRITICAL: {} IN {} ZONE!",
                self.class_name.to_uppercase(),
                self.zone.as_str().to_uppercase()
            ),
            Severity::Warning => {
                write!(f, "WARNING: {} detected in {} zone", self.class_name, self.zone)
            }
        }
    }
}

/// What counts as "objects" when computing density.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DensityPolicy {
    /// Every raw detector row, before confidence filtering.
    #[default]
    RawOutputs,
    /// Only rows that pass the confidence threshold and decode cleanly.
    ConfidentOnly,
}

impl FromStr for DensityPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "raw-outputs" => Ok(DensityPolicy::RawOutputs),
            "confident-only" => Ok(DensityPolicy::ConfidentOnly),
            other => Err(anyhow!(
                "unknown density policy '{}' (expected raw-outputs or confident-only)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RiskConfig {
    pub confidence_threshold: f32,
    pub density_policy: DensityPolicy,
    pub high_priority_classes: BTreeSet<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            density_policy: DensityPolicy::default(),
            high_priority_classes: HIGH_PRIORITY_CLASSES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// A detection annotated with where it is and how it moves.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecoratedDetection {
    pub detection: Detection,
    pub object_id: String,
    pub zone: ZoneId,
    pub motion: MotionDirection,
}

/// Result of evaluating one frame.
#[derive(Clone, Debug, Serialize)]
pub struct RiskAssessment {
    pub zones: ZoneLayout,
    pub thresholds: Thresholds,
    pub density: f64,
    pub risk: RiskMap,
    pub warnings: Vec<Warning>,
    pub detections: Vec<DecoratedDetection>,
    /// Rows skipped as malformed.
    pub rejected: usize,
}

pub struct RiskEvaluator {
    config: RiskConfig,
}

impl RiskEvaluator {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn is_high_priority(&self, class_name: &str) -> bool {
        self.config.high_priority_classes.contains(class_name)
    }

    /// Evaluate one frame's detector output.
    ///
    /// Malformed rows are logged and skipped; they never abort the frame.
    pub fn evaluate(
        &self,
        width: u32,
        height: u32,
        output: &DetectorOutput,
        vocab: &ClassVocabulary,
        tracker: &mut PositionTracker,
    ) -> RiskAssessment {
        let zones = ZoneLayout::for_frame(width, height);
        let mut risk = RiskMap::all_low();

        let (accepted, rejected) = self.decode(width, height, output, vocab);

        let frame_area = width as f64 * height as f64;
        let object_count = match self.config.density_policy {
            DensityPolicy::RawOutputs => output.raw_count(),
            DensityPolicy::ConfidentOnly => accepted.len(),
        };
        let density = if frame_area > 0.0 {
            object_count as f64 / frame_area
        } else {
            0.0
        };
        let thresholds = Thresholds::compute(frame_area, density);

        let mut warnings = Vec::new();
        let mut detections = Vec::with_capacity(accepted.len());

        tracker.begin_frame();
        for detection in accepted {
            let bbox_area = detection.bbox.area() as f64;
            let (object_id, motion) = tracker.observe(&detection.bbox);
            let zone = zones.classify(detection.bbox.center);

            if bbox_area > thresholds.critical && self.is_high_priority(&detection.class_name) {
                risk.raise(zone, RiskLevel::High);
                warnings.push(Warning {
                    severity: Severity::Critical,
                    class_name: detection.class_name.clone(),
                    zone,
                });
            } else if bbox_area > thresholds.warning {
                risk.raise(zone, RiskLevel::Medium);
                warnings.push(Warning {
                    severity: Severity::Warning,
                    class_name: detection.class_name.clone(),
                    zone,
                });
            }

            detections.push(DecoratedDetection {
                detection,
                object_id,
                zone,
                motion,
            });
        }
        tracker.end_frame();

        RiskAssessment {
            zones,
            thresholds,
            density,
            risk,
            warnings,
            detections,
            rejected,
        }
    }

    /// Confidence-filter and decode rows, preserving order.
    fn decode(
        &self,
        width: u32,
        height: u32,
        output: &DetectorOutput,
        vocab: &ClassVocabulary,
    ) -> (Vec<Detection>, usize) {
        let mut accepted = Vec::new();
        let mut rejected = 0;

        for (index, raw) in output.iter().enumerate() {
            let confidence = match raw.best_class() {
                Some(_) if raw.scores.iter().any(|s| !s.is_finite()) => {
                    log::warn!("skipping detection #{}: non-finite confidence", index);
                    rejected += 1;
                    continue;
                }
                Some((_, confidence)) => confidence,
                None => {
                    log::warn!("skipping detection #{}: no class scores", index);
                    rejected += 1;
                    continue;
                }
            };
            if confidence <= self.config.confidence_threshold {
                continue;
            }
            match Detection::from_raw(raw, vocab, width, height) {
                Ok(detection) => accepted.push(detection),
                Err(e) => {
                    log::warn!("skipping detection #{}: {}", index, e);
                    rejected += 1;
                }
            }
        }

        (accepted, rejected)
    }
}

impl Default for RiskEvaluator {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::RawDetection;

    const W: u32 = 640;
    const H: u32 = 480;

    /// Raw row for a COCO class at a normalized position and size.
    fn row(class_id: usize, confidence: f32, cx: f32, cy: f32, w: f32, h: f32) -> RawDetection {
        let mut scores = vec![0.0; 80];
        scores[class_id] = confidence;
        RawDetection {
            cx,
            cy,
            w,
            h,
            objectness: confidence,
            scores,
        }
    }

    fn evaluate(rows: Vec<RawDetection>) -> RiskAssessment {
        let mut tracker = PositionTracker::quantized();
        RiskEvaluator::default().evaluate(
            W,
            H,
            &DetectorOutput::single_layer(rows),
            &ClassVocabulary::coco(),
            &mut tracker,
        )
    }

    #[test]
    fn warning_text_formats() {
        let critical = Warning {
            severity: Severity::Critical,
            class_name: "car".into(),
            zone: ZoneId::Center,
        };
        assert_eq!(critical.to_string(), "CRITICAL: CAR IN CENTER ZONE!");
        let warning = Warning {
            severity: Severity::Warning,
            class_name: "dog".into(),
            zone: ZoneId::Left,
        };
        assert_eq!(warning.to_string(), "WARNING: dog detected in left zone");
    }

    #[test]
    fn risk_map_never_lowers() {
        let mut map = RiskMap::all_low();
        assert_eq!(map.raise(ZoneId::Left, RiskLevel::High), RiskLevel::High);
        assert_eq!(map.raise(ZoneId::Left, RiskLevel::Medium), RiskLevel::High);
        assert_eq!(map.raise(ZoneId::Left, RiskLevel::Low), RiskLevel::High);
        assert_eq!(map.get(ZoneId::Right), Some(RiskLevel::Low));
        assert_eq!(map.highest(), RiskLevel::High);
    }

    #[test]
    fn critical_car_in_center() {
        // 0.6 x 0.6 of the frame: area 0.36 > 0.2 critical fraction
        let a = evaluate(vec![row(2, 0.9, 0.5, 0.5, 0.6, 0.6)]);
        assert_eq!(a.risk.get(ZoneId::Center), Some(RiskLevel::High));
        assert_eq!(a.risk.get(ZoneId::Left), Some(RiskLevel::Low));
        assert_eq!(a.risk.get(ZoneId::Right), Some(RiskLevel::Low));
        assert_eq!(a.warnings.len(), 1);
        let text = a.warnings[0].to_string();
        assert!(text.contains("CRITICAL") && text.contains("CAR") && text.contains("CENTER"));
    }

    #[test]
    fn large_low_priority_object_only_warns() {
        // dog (16) with a critical-sized box stays medium
        let a = evaluate(vec![row(16, 0.9, 0.5, 0.5, 0.6, 0.6)]);
        assert_eq!(a.risk.get(ZoneId::Center), Some(RiskLevel::Medium));
        assert_eq!(a.warnings[0].severity, Severity::Warning);
    }

    #[test]
    fn medium_does_not_override_high() {
        let a = evaluate(vec![
            row(0, 0.9, 0.5, 0.5, 0.6, 0.6),
            row(16, 0.9, 0.5, 0.45, 0.4, 0.4),
        ]);
        assert_eq!(a.risk.get(ZoneId::Center), Some(RiskLevel::High));
        assert_eq!(a.warnings.len(), 2);
        assert_eq!(a.warnings[0].severity, Severity::Critical);
        assert_eq!(a.warnings[1].severity, Severity::Warning);
    }

    #[test]
    fn zone_levels_independent_of_order() {
        let high = row(2, 0.9, 0.5, 0.5, 0.6, 0.6);
        let medium = row(16, 0.9, 0.52, 0.5, 0.4, 0.4);
        let forward = evaluate(vec![high.clone(), medium.clone()]);
        let backward = evaluate(vec![medium, high]);
        assert_eq!(forward.risk, backward.risk);
        assert_eq!(forward.risk.get(ZoneId::Center), Some(RiskLevel::High));
    }

    #[test]
    fn low_confidence_is_invisible() {
        let a = evaluate(vec![row(2, 0.5, 0.5, 0.5, 0.6, 0.6), row(2, 0.3, 0.1, 0.5, 0.6, 0.6)]);
        assert!(a.warnings.is_empty());
        assert!(a.detections.is_empty());
        assert_eq!(a.risk, RiskMap::all_low());
        assert_eq!(a.rejected, 0);
    }

    #[test]
    fn small_box_is_decorated_without_warning() {
        let a = evaluate(vec![row(2, 0.9, 0.1, 0.5, 0.05, 0.05)]);
        assert!(a.warnings.is_empty());
        assert_eq!(a.detections.len(), 1);
        assert_eq!(a.detections[0].zone, ZoneId::Left);
        assert_eq!(a.detections[0].motion, MotionDirection::Static);
        assert_eq!(a.risk, RiskMap::all_low());
    }

    #[test]
    fn malformed_rows_skipped_not_fatal() {
        let mut nan = row(2, 0.9, 0.5, 0.5, 0.6, 0.6);
        nan.cx = f32::NAN;
        let mut nan_score = row(2, 0.9, 0.5, 0.5, 0.6, 0.6);
        nan_score.scores[2] = f32::NAN;
        let good = row(7, 0.8, 0.85, 0.5, 0.5, 0.5);

        let a = evaluate(vec![nan, nan_score, good]);
        assert_eq!(a.rejected, 2);
        assert_eq!(a.detections.len(), 1);
        assert_eq!(a.risk.get(ZoneId::Right), Some(RiskLevel::High));
        assert_eq!(a.warnings[0].to_string(), "CRITICAL: TRUCK IN RIGHT ZONE!");
    }

    #[test]
    fn class_outside_vocabulary_rejected() {
        let vocab = ClassVocabulary::parse("car").unwrap();
        let mut tracker = PositionTracker::quantized();
        let mut r = row(0, 0.0, 0.5, 0.5, 0.6, 0.6);
        r.scores = vec![0.1, 0.9];
        let a = RiskEvaluator::default().evaluate(
            W,
            H,
            &DetectorOutput::single_layer(vec![r]),
            &vocab,
            &mut tracker,
        );
        assert_eq!(a.rejected, 1);
        assert!(a.warnings.is_empty());
    }

    #[test]
    fn off_frame_geometry_rejected() {
        let runaway = row(2, 0.9, 1.0e7, 0.5, 0.5, 0.5);
        let a = evaluate(vec![runaway]);
        assert_eq!(a.rejected, 1);
        assert!(a.detections.is_empty());
        assert!(a.warnings.is_empty());
        assert_eq!(a.risk, RiskMap::all_low());
    }

    #[test]
    fn density_counts_raw_rows_by_default() {
        let mut rows: Vec<RawDetection> = (0..100).map(|_| row(2, 0.1, 0.5, 0.5, 0.1, 0.1)).collect();
        rows.push(row(2, 0.9, 0.5, 0.5, 0.1, 0.1));
        let a = evaluate(rows.clone());
        assert_eq!(a.density, 101.0 / (W as f64 * H as f64));

        let mut tracker = PositionTracker::quantized();
        let strict = RiskEvaluator::new(RiskConfig {
            density_policy: DensityPolicy::ConfidentOnly,
            ..RiskConfig::default()
        })
        .evaluate(
            W,
            H,
            &DetectorOutput::single_layer(rows),
            &ClassVocabulary::coco(),
            &mut tracker,
        );
        assert_eq!(strict.density, 1.0 / (W as f64 * H as f64));
        assert!(strict.thresholds.critical > a.thresholds.critical);
    }

    #[test]
    fn density_spans_all_layers() {
        let r = row(2, 0.1, 0.5, 0.5, 0.1, 0.1);
        let output = DetectorOutput {
            layers: vec![vec![r.clone(); 3], vec![r; 2]],
        };
        let mut tracker = PositionTracker::quantized();
        let a = RiskEvaluator::default().evaluate(W, H, &output, &ClassVocabulary::coco(), &mut tracker);
        assert_eq!(a.density, 5.0 / (W as f64 * H as f64));
    }

    #[test]
    fn same_position_next_frame_moves_towards() {
        let evaluator = RiskEvaluator::default();
        let vocab = ClassVocabulary::coco();
        let mut tracker = PositionTracker::quantized();
        let output = DetectorOutput::single_layer(vec![row(0, 0.9, 0.25, 0.5, 0.1, 0.2)]);

        let first = evaluator.evaluate(W, H, &output, &vocab, &mut tracker);
        let second = evaluator.evaluate(W, H, &output, &vocab, &mut tracker);
        assert_eq!(first.detections[0].motion, MotionDirection::Static);
        assert_eq!(second.detections[0].motion, MotionDirection::Towards);
        assert_eq!(first.detections[0].object_id, "160-240");
    }

    #[test]
    fn density_policy_parses() {
        assert_eq!("raw-outputs".parse::<DensityPolicy>().unwrap(), DensityPolicy::RawOutputs);
        assert_eq!(
            "confident-only".parse::<DensityPolicy>().unwrap(),
            DensityPolicy::ConfidentOnly
        );
        assert!("strict".parse::<DensityPolicy>().is_err());
    }
}
