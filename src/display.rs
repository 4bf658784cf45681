//! Display surfaces and the stop signal.
//!
//! A `Canvas` receives every finished frame. Actual windowing is outside this
//! crate; the canvases here write PNGs, keep frames in memory, or discard them.

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait Canvas {
    /// Present one finished frame.
    fn show(&mut self, frame_id: u64, image: &RgbImage) -> Result<()>;

    /// Polled once per frame boundary.
    fn stop_requested(&self) -> bool {
        false
    }
}

impl<C: Canvas + ?Sized> Canvas for Box<C> {
    fn show(&mut self, frame_id: u64, image: &RgbImage) -> Result<()> {
        (**self).show(frame_id, image)
    }

    fn stop_requested(&self) -> bool {
        (**self).stop_requested()
    }
}

/// Externally observed stop request, shared between threads.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Writes each frame as `frame_<id>.png` into a directory.
pub struct DirectoryCanvas {
    dir: PathBuf,
    written: u64,
}

impl DirectoryCanvas {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Canvas for DirectoryCanvas {
    fn show(&mut self, frame_id: u64, image: &RgbImage) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", frame_id));
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }
}

/// Keeps the most recent frame in memory.
#[derive(Default)]
pub struct MemoryCanvas {
    pub last: Option<(u64, RgbImage)>,
    pub shown: u64,
    stop_after: Option<u64>,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop once `frames` frames have been shown.
    pub fn stop_after(frames: u64) -> Self {
        Self {
            stop_after: Some(frames),
            ..Self::default()
        }
    }
}

impl Canvas for MemoryCanvas {
    fn show(&mut self, frame_id: u64, image: &RgbImage) -> Result<()> {
        self.last = Some((frame_id, image.clone()));
        self.shown += 1;
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.stop_after.is_some_and(|limit| self.shown >= limit)
    }
}

/// Discards frames.
#[derive(Default)]
pub struct NullCanvas;

impl Canvas for NullCanvas {
    fn show(&mut self, _frame_id: u64, _image: &RgbImage) -> Result<()> {
        Ok(())
    }
}
