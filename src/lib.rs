//! Collision Overlay
//!
//! Real-time collision-risk assessment for a single camera feed. Each frame's
//! detections are placed into three spatial zones, weighed against
//! density-scaled area thresholds, and turned into per-zone risk levels,
//! human-readable warnings and a blended heatmap.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource -> detector worker -> RiskEvaluator -> draw boxes -> HeatmapRenderer -> Canvas
//!                                       |
//!                              PositionTracker (owned by the cycle)
//! ```
//!
//! # Module Structure
//!
//! - `threshold`: critical/warning area cutoffs scaled by density
//! - `zone`: pixel geometry, zone layout and point classification
//! - `tracker`: identifier assignment and motion heuristics
//! - `risk`: per-frame evaluation, risk levels and warnings
//! - `heatmap`: zone overlay and detection outlines
//! - `detect`: detector backends and raw output decoding
//! - `ingest`: frame sources
//! - `display`: canvases and the stop signal
//! - `cycle`: the frame loop, sequential or pipelined
//! - `config`: layered configuration
//! - `ui`: terminal progress for the binary

pub mod config;
pub mod cycle;
pub mod detect;
pub mod display;
pub mod frame;
pub mod heatmap;
pub mod ingest;
pub mod risk;
pub mod threshold;
pub mod tracker;
pub mod ui;
pub mod vocab;
pub mod zone;

pub use config::OverlayConfig;
pub use cycle::{CycleSettings, CycleStats, FrameCycle, FrameReport, StepOutcome};
pub use detect::{
    BackendRegistry, Detection, DetectorBackend, DetectorOutput, RawDetection, ScriptedBackend,
    SharedBackend, StubBackend,
};
pub use display::{Canvas, DirectoryCanvas, MemoryCanvas, NullCanvas, StopSignal};
pub use frame::{Frame, FrameSlot};
pub use heatmap::HeatmapRenderer;
pub use ingest::{open_source, FileSource, FrameSource, SyntheticSource};
pub use risk::{
    DensityPolicy, RiskAssessment, RiskConfig, RiskEvaluator, RiskLevel, RiskMap, Severity,
    Warning,
};
pub use threshold::Thresholds;
pub use tracker::{
    IdentityKind, IdentityStrategy, IouMatcher, MotionDirection, PositionTracker,
    QuantizedPosition, TrackerStore,
};
pub use vocab::ClassVocabulary;
pub use zone::{PixelBox, PixelPoint, ZoneId, ZoneLayout, ZoneRect};
