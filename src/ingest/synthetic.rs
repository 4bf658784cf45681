//! Synthetic frame source for `stub://` URIs.
//!
//! Produces a moving diagonal gradient at a fixed size. Useful with the
//! scripted detector, where pixel content does not matter.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    /// Stop after this many frames; `None` runs forever.
    pub max_frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            uri: "stub://camera".to_string(),
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "synthetic source needs a non-zero size, got {}x{}",
                config.width,
                config.height
            ));
        }
        Ok(Self {
            config,
            frame_count: 0,
        })
    }

    fn generate(&self) -> RgbImage {
        let shift = self.frame_count as u32;
        RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            let v = (x.wrapping_add(y).wrapping_add(shift) % 256) as u8;
            Rgb([v, v / 2, 255 - v])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.uri);
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
        let image = self.generate();
        let frame = Frame::new(self.frame_count, image);
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_sized_frames_until_limit() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 32,
            height: 16,
            max_frames: Some(2),
            ..SyntheticConfig::default()
        })?;
        source.connect()?;

        let first = source.next_frame()?.expect("first frame");
        assert_eq!((first.width(), first.height()), (32, 16));
        assert_eq!(first.id, 0);
        let second = source.next_frame()?.expect("second frame");
        assert_eq!(second.id, 1);
        assert_ne!(first.image(), second.image());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn zero_size_rejected() {
        let config = SyntheticConfig {
            width: 0,
            ..SyntheticConfig::default()
        };
        assert!(SyntheticSource::new(config).is_err());
    }
}
