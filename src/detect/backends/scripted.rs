use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::path::Path;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::DetectorOutput;
use crate::frame::Frame;

/// Replays pre-recorded detector outputs, one per frame.
///
/// Recordings are JSON lines, each a serialized `DetectorOutput`. Once the
/// script runs out every further frame gets an empty output.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: VecDeque<DetectorOutput>,
}

impl ScriptedBackend {
    pub fn new(outputs: Vec<DetectorOutput>) -> Self {
        Self {
            script: outputs.into(),
        }
    }

    pub fn parse(jsonl: &str) -> Result<Self> {
        let mut outputs = Vec::new();
        for (lineno, line) in jsonl.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let output: DetectorOutput = serde_json::from_str(line)
                .with_context(|| format!("invalid detector output on line {}", lineno + 1))?;
            outputs.push(output);
        }
        Ok(Self::new(outputs))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("in {}", path.display()))
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectorOutput> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
