use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::DetectorOutput;
use crate::frame::Frame;

/// Stub backend. Sees nothing, so every zone stays low.
#[derive(Debug, Default)]
pub struct StubBackend {
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectorOutput> {
        self.frames_seen += 1;
        Ok(DetectorOutput::default())
    }
}
