//! Class vocabulary.
//!
//! Detectors report a class index; the vocabulary maps it to a name. It is
//! loaded once at startup and never changes afterwards.

use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Darknet's 80-class COCO label list, in model order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorbike", "aeroplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "sofa", "pottedplant",
    "bed", "diningtable", "toilet", "tvmonitor", "laptop", "mouse", "remote", "keyboard",
    "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase",
    "scissors", "teddy bear", "hair drier", "toothbrush",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassVocabulary {
    names: Vec<String>,
}

impl ClassVocabulary {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(anyhow!("class vocabulary must not be empty"));
        }
        Ok(Self { names })
    }

    pub fn coco() -> Self {
        Self {
            names: COCO_CLASSES.iter().map(|name| name.to_string()).collect(),
        }
    }

    /// Parse one label per line. The line number is the class id, so blank
    /// lines keep their slot as an empty name.
    pub fn parse(text: &str) -> Result<Self> {
        let names: Vec<String> = text.lines().map(|line| line.trim().to_string()).collect();
        if names.iter().all(String::is_empty) {
            return Err(anyhow!("class vocabulary has no labels"));
        }
        Self::new(names)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid labels file {}", path.display()))
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ClassVocabulary {
    fn default() -> Self {
        Self::coco()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_order_matches_darknet() {
        let vocab = ClassVocabulary::coco();
        assert_eq!(vocab.len(), 80);
        assert_eq!(vocab.name(0), Some("person"));
        assert_eq!(vocab.name(2), Some("car"));
        assert_eq!(vocab.name(3), Some("motorbike"));
        assert_eq!(vocab.name(7), Some("truck"));
        assert_eq!(vocab.name(80), None);
    }

    #[test]
    fn blank_lines_keep_their_class_id() -> Result<()> {
        let vocab = ClassVocabulary::parse("car\n\n  person \r\ntruck\n")?;
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.name(0), Some("car"));
        assert_eq!(vocab.name(1), Some(""));
        assert_eq!(vocab.name(2), Some("person"));
        assert_eq!(vocab.name(3), Some("truck"));
        assert_eq!(vocab.name(4), None);
        Ok(())
    }

    #[test]
    fn empty_vocabulary_rejected() {
        assert!(ClassVocabulary::parse("\n\n").is_err());
    }
}
