//! Frame sources.
//!
//! - `stub://<name>` synthetic frames (tests, demos)
//! - a local directory of PNG/JPEG images, played in file-name order
//!
//! `next_frame` yields `Ok(None)` at end of stream. Any `Err` means the
//! source is unreadable; the frame cycle stops on either.

pub mod file;
pub mod synthetic;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Capture statistics.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub uri: String,
}

pub trait FrameSource: Send {
    /// Prepare the source. Called once before the first frame.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame, or `None` when the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn stats(&self) -> SourceStats;
}

/// Open a source from a URI: `stub://...` or a local directory path.
pub fn open_source(
    uri: &str,
    width: u32,
    height: u32,
    max_frames: Option<u64>,
) -> Result<Box<dyn FrameSource>> {
    if uri.starts_with("stub://") {
        Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            uri: uri.to_string(),
            width,
            height,
            max_frames,
        })?))
    } else {
        Ok(Box::new(FileSource::new(FileConfig {
            path: uri.to_string(),
            max_frames,
        })?))
    }
}
