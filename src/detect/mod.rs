//! Object detector interface.
//!
//! The detector itself is an external collaborator: given a frame it returns
//! raw per-anchor rows grouped by output layer. This module defines that
//! contract, decodes rows into pixel-space detections, and provides the
//! backends shipped with the crate.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{Detection, DetectorOutput, RawDetection, RAW_ROW_PREFIX};
