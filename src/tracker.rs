//! Rudimentary motion inference from positional history.
//!
//! `TrackerStore` keeps the last known position per identifier across frames.
//! Identifiers come from an `IdentityStrategy`; the default derives them from
//! the truncated pixel center, so two objects passing through the same pixel
//! collapse into one entry. That is a heuristic, not object identity.
//!
//! Motion rule: when an identifier was seen before, the squared displacement
//! from its stored position is compared against the current box area
//! (`< area` is `towards`, otherwise `away`); a first sighting is `static`.
//! The stored position is overwritten on every update.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::zone::{PixelBox, PixelPoint};

/// Minimum IoU for the `iou` strategy to treat two boxes as one object.
pub const IOU_MATCH_THRESHOLD: f64 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionDirection {
    Towards,
    Away,
    Static,
}

impl fmt::Display for MotionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MotionDirection::Towards => "towards",
            MotionDirection::Away => "away",
            MotionDirection::Static => "static",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedObject {
    pub id: String,
    pub position: PixelPoint,
    last_update: u64,
}

// ----------------------------------------------------------------------------
// TrackerStore
// ----------------------------------------------------------------------------

/// Position history keyed by identifier.
///
/// Unbounded by default. With a capacity, inserting a new identifier into a
/// full store evicts the least recently updated entry first.
#[derive(Debug, Default)]
pub struct TrackerStore {
    entries: HashMap<String, TrackedObject>,
    capacity: Option<usize>,
    clock: u64,
}

impl TrackerStore {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(4096)),
            capacity: Some(capacity.max(1)),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, object_id: &str) -> Option<&TrackedObject> {
        self.entries.get(object_id)
    }

    /// Infer motion for `object_id` and record `position` as its latest.
    pub fn update(
        &mut self,
        object_id: &str,
        position: PixelPoint,
        bbox_area: i64,
    ) -> MotionDirection {
        self.clock += 1;
        let tick = self.clock;

        if let Some(entry) = self.entries.get_mut(object_id) {
            // squared distance of two i32 points needs more than 64 bits
            let dx = position.x as i128 - entry.position.x as i128;
            let dy = position.y as i128 - entry.position.y as i128;
            let direction = if dx * dx + dy * dy < bbox_area as i128 {
                MotionDirection::Towards
            } else {
                MotionDirection::Away
            };
            entry.position = position;
            entry.last_update = tick;
            return direction;
        }

        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                if !self.evict_least_recent() {
                    break;
                }
            }
        }
        self.entries.insert(
            object_id.to_string(),
            TrackedObject {
                id: object_id.to_string(),
                position,
                last_update: tick,
            },
        );
        MotionDirection::Static
    }

    /// Forget an identifier. Returns true when it was present.
    pub fn retire(&mut self, object_id: &str) -> bool {
        self.entries.remove(object_id).is_some()
    }

    fn evict_least_recent(&mut self) -> bool {
        let Some(oldest) = self
            .entries
            .values()
            .min_by_key(|entry| entry.last_update)
            .map(|entry| entry.id.clone())
        else {
            return false;
        };
        log::debug!("tracker: evicting {}", oldest);
        self.entries.remove(&oldest);
        true
    }
}

// ----------------------------------------------------------------------------
// Identity strategies
// ----------------------------------------------------------------------------

/// Assigns identifiers to detections.
///
/// `begin_frame`/`end_frame` bracket every frame; `end_frame` returns
/// identifiers the strategy considers gone, which the tracker retires.
pub trait IdentityStrategy: Send {
    fn name(&self) -> &'static str;

    fn begin_frame(&mut self) {}

    fn assign(&mut self, bbox: &PixelBox) -> String;

    fn end_frame(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// Identifier from the truncated pixel center: `"{x}-{y}"`.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuantizedPosition;

impl QuantizedPosition {
    pub fn id_for(center: PixelPoint) -> String {
        format!("{}-{}", center.x, center.y)
    }
}

impl IdentityStrategy for QuantizedPosition {
    fn name(&self) -> &'static str {
        "quantized-position"
    }

    fn assign(&mut self, bbox: &PixelBox) -> String {
        Self::id_for(bbox.center)
    }
}

/// Greedy IoU matching against the previous frame's boxes.
#[derive(Debug)]
pub struct IouMatcher {
    threshold: f64,
    previous: Vec<(String, PixelBox)>,
    current: Vec<(String, PixelBox)>,
    claimed: Vec<bool>,
    next_id: u64,
}

impl IouMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: Vec::new(),
            current: Vec::new(),
            claimed: Vec::new(),
            next_id: 0,
        }
    }
}

impl Default for IouMatcher {
    fn default() -> Self {
        Self::new(IOU_MATCH_THRESHOLD)
    }
}

impl IdentityStrategy for IouMatcher {
    fn name(&self) -> &'static str {
        "iou"
    }

    fn begin_frame(&mut self) {
        self.previous = std::mem::take(&mut self.current);
        self.claimed = vec![false; self.previous.len()];
    }

    fn assign(&mut self, bbox: &PixelBox) -> String {
        let best = self
            .previous
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.claimed[*i])
            .map(|(i, (_, prev))| (i, prev.iou(bbox)))
            .filter(|(_, iou)| *iou >= self.threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let id = match best {
            Some((i, _)) => {
                self.claimed[i] = true;
                self.previous[i].0.clone()
            }
            None => {
                let id = format!("track-{}", self.next_id);
                self.next_id += 1;
                id
            }
        };
        self.current.push((id.clone(), *bbox));
        id
    }

    fn end_frame(&mut self) -> Vec<String> {
        self.previous
            .iter()
            .zip(self.claimed.iter())
            .filter(|(_, claimed)| !**claimed)
            .map(|((id, _), _)| id.clone())
            .collect()
    }
}

/// Configurable choice of identity strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityKind {
    #[default]
    QuantizedPosition,
    Iou,
}

impl IdentityKind {
    pub fn build(self) -> Box<dyn IdentityStrategy> {
        match self {
            IdentityKind::QuantizedPosition => Box::new(QuantizedPosition),
            IdentityKind::Iou => Box::new(IouMatcher::default()),
        }
    }
}

impl FromStr for IdentityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "quantized-position" => Ok(IdentityKind::QuantizedPosition),
            "iou" => Ok(IdentityKind::Iou),
            other => Err(anyhow!(
                "unknown identity strategy '{}' (expected quantized-position or iou)",
                other
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// PositionTracker
// ----------------------------------------------------------------------------

/// Store plus identity strategy. Owned by the frame cycle; single writer.
pub struct PositionTracker {
    store: TrackerStore,
    strategy: Box<dyn IdentityStrategy>,
}

impl PositionTracker {
    pub fn new(store: TrackerStore, strategy: Box<dyn IdentityStrategy>) -> Self {
        Self { store, strategy }
    }

    /// Unbounded store keyed by quantized position.
    pub fn quantized() -> Self {
        Self::new(TrackerStore::unbounded(), Box::new(QuantizedPosition))
    }

    pub fn with_settings(capacity: Option<usize>, identity: IdentityKind) -> Self {
        let store = match capacity {
            Some(capacity) => TrackerStore::with_capacity(capacity),
            None => TrackerStore::unbounded(),
        };
        Self::new(store, identity.build())
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn store(&self) -> &TrackerStore {
        &self.store
    }

    pub fn begin_frame(&mut self) {
        self.strategy.begin_frame();
    }

    pub fn end_frame(&mut self) {
        for id in self.strategy.end_frame() {
            self.store.retire(&id);
        }
    }

    /// Identify a detection box and infer its motion.
    pub fn observe(&mut self, bbox: &PixelBox) -> (String, MotionDirection) {
        let id = self.strategy.assign(bbox);
        let direction = self.store.update(&id, bbox.center, bbox.area());
        (id, direction)
    }

    /// Infer motion for a caller-supplied identifier.
    pub fn update(
        &mut self,
        object_id: &str,
        position: PixelPoint,
        bbox_area: i64,
    ) -> MotionDirection {
        self.store.update(object_id, position, bbox_area)
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::quantized()
    }
}
