#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DetectorOutput, RawDetection, RAW_ROW_PREFIX};
use crate::frame::Frame;

/// Tract-based backend for YOLO-style ONNX models.
///
/// Frames are resized to the model input, scaled to `0..1` and fed as NCHW
/// RGB. Every model output is read as rows of `[cx, cy, w, h, objectness,
/// scores...]` with normalized geometry; each output becomes one layer.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_width: u32,
    input_height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
        })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let resized = image::imageops::resize(
            frame.image(),
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn decode_layer(output: &Tensor) -> Result<Vec<RawDetection>> {
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let row_len = *view
            .shape()
            .last()
            .ok_or_else(|| anyhow!("model output has no dimensions"))?;
        if row_len <= RAW_ROW_PREFIX {
            return Err(anyhow!(
                "model output rows of {} values cannot hold class scores",
                row_len
            ));
        }
        let values: Vec<f32> = view.iter().copied().collect();
        Ok(values
            .chunks_exact(row_len)
            .filter_map(RawDetection::from_row)
            .collect())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectorOutput> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let layers = outputs
            .iter()
            .map(|output| Self::decode_layer(output))
            .collect::<Result<Vec<_>>>()?;
        Ok(DetectorOutput { layers })
    }
}
