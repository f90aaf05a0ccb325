use super::model::ImageClassificationModel;
use crate::error::{PipelineError, Result};
use candle_core::{DType, Tensor};

/// Run `model` on a preprocessed `[1, S, S, 3]` tensor and read back its scores.
///
/// Consumes the input tensor; the output tensor is dropped once its values
/// have been copied out.
pub fn invoke<M: ImageClassificationModel + ?Sized>(model: &M, input: Tensor) -> Result<Vec<f32>> {
    let size = model.input_size();
    let expected = [1, size, size, 3];
    if input.dims() != expected {
        return Err(PipelineError::Inference(format!(
            "Input tensor has shape {:?}, model expects {:?}",
            input.dims(),
            expected
        )));
    }

    let output = model
        .forward(&input)
        .map_err(|e| PipelineError::Inference(format!("Forward pass failed: {e}")))?;
    drop(input);

    let raw = output
        .flatten_all()
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(|e| PipelineError::Inference(format!("Failed to read model output: {e}")))?;
    drop(output);

    if raw.len() != model.num_labels() {
        return Err(PipelineError::Inference(format!(
            "Model produced {} scores, expected {}",
            raw.len(),
            model.num_labels()
        )));
    }

    Ok(raw)
}
