//! ONNX models executed with the pure-Rust `tract` runtime.

use std::path::Path;

use ndarray::{ArrayD, ArrayView4};
use tract_onnx::prelude::*;

use crate::{
    error::{Result, StitchError},
    model::{InputGeometry, InputLayout, SegmentationModel, unpad_output},
};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// An optimized ONNX graph with a fixed input batch shape.
///
/// The final, partial batch of a request is padded up to the fixed batch size
/// by repeating its last tile; the extra outputs are dropped.
pub struct OnnxModel {
    plan: Plan,
    geometry: InputGeometry,
    name: String,
}

impl OnnxModel {
    pub fn load(path: &Path, geometry: InputGeometry) -> Result<Self> {
        let InputGeometry { batch_size, tile_size, channels, layout } = geometry;
        let shape = match layout {
            InputLayout::Nhwc => [batch_size, tile_size, tile_size, channels],
            InputLayout::Nchw => [batch_size, channels, tile_size, tile_size],
        };

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(shape).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| StitchError::ModelLoad(format!("{}: {e}", path.display())))?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx")
            .to_string();

        Ok(Self { plan, geometry, name })
    }
}

impl SegmentationModel for OnnxModel {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        let count = batch.shape()[0];
        let fixed = self.geometry.batch_size;
        if count == 0 || count > fixed {
            return Err(StitchError::Model(format!(
                "batch of {count} tiles does not fit the fixed batch size {fixed}"
            )));
        }

        let mut shape = batch.shape().to_vec();
        let mut samples: Vec<f32> = batch.iter().copied().collect();
        let per_tile = samples.len() / count;
        for _ in count..fixed {
            samples.extend_from_within(samples.len() - per_tile..);
        }
        shape[0] = fixed;

        let input = Tensor::from_shape(&shape, &samples)
            .map_err(|e| StitchError::Model(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| StitchError::Model(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| StitchError::Model("model produced no outputs".to_string()))?;

        let values = output
            .as_slice::<f32>()
            .map_err(|e| StitchError::Model(e.to_string()))?;
        unpad_output(output.shape(), values, count, self.geometry.tile_size)
    }

    fn input_layout(&self) -> InputLayout {
        self.geometry.layout
    }

    fn name(&self) -> &str {
        &self.name
    }
}
