use anyhow::Result;

use crate::detect::result::DetectorOutput;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Implementations receive the frame by reference and return raw rows only;
/// no contract is placed on how detections are computed. A backend is owned
/// by exactly one detector worker at a time.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<DetectorOutput>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
