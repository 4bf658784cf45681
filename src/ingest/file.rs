//! Image-sequence frame source.
//!
//! Plays a local directory of `.png`/`.jpg`/`.jpeg` files in lexicographic
//! file-name order. Frame size follows each image, so resolution may change
//! mid-stream. The end of the listing is the end of the stream.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local directory (no URL schemes).
    pub path: String,
    pub max_frames: Option<u64>,
}

pub struct FileSource {
    config: FileConfig,
    pending: VecDeque<PathBuf>,
    frame_count: u64,
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_path(&config.path) {
            return Err(anyhow!(
                "file source only supports local directories, got '{}'",
                config.path
            ));
        }
        Ok(Self {
            config,
            pending: VecDeque::new(),
            frame_count: 0,
        })
    }

    fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to list frame directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        let images = Self::list_images(Path::new(&self.config.path))?;
        log::info!(
            "FileSource: {} frames queued from {}",
            images.len(),
            self.config.path
        );
        self.pending = images.into();
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?
            .to_rgb8();
        let frame = Frame::new(self.frame_count, image);
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.path.clone(),
        }
    }
}

fn is_local_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}
