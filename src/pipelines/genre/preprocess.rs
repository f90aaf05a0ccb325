use crate::error::{PipelineError, Result};
use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::DynamicImage;

/// Default square input size of the genre model.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Turns decoded images into model input tensors.
///
/// The image is converted to floating point RGB in `[0, 1]`, stretched to
/// `S x S` with bilinear filtering (aspect ratio is not kept) and given a
/// leading batch dimension, producing `[1, S, S, 3]` `f32`.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    size: u32,
    filter: FilterType,
}

impl ImagePreprocessor {
    /// Create a preprocessor for `size x size` inputs.
    pub fn new(size: u32) -> Result<Self> {
        if size == 0 {
            return Err(PipelineError::Config("Input size must be positive".into()));
        }
        Ok(Self {
            size,
            filter: FilterType::Triangle,
        })
    }

    /// Side length of the produced tensor.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Preprocess one image onto `device`.
    pub fn preprocess(&self, image: &DynamicImage, device: &Device) -> Result<Tensor> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::Decode("Image has no pixels".into()));
        }

        // interpolate in float so resized values keep sub-level precision
        let rgb = image.to_rgb32f();
        let resized = image::imageops::resize(&rgb, self.size, self.size, self.filter);
        drop(rgb);
        let side = self.size as usize;

        let batched = Tensor::from_vec(resized.into_raw(), (side, side, 3), device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| PipelineError::Inference(format!("Failed to build input tensor: {e}")))?;

        Ok(batched)
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            size: DEFAULT_INPUT_SIZE,
            filter: FilterType::Triangle,
        }
    }
}

/// Decode encoded image bytes (PNG, JPEG, ...) into an image.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(PipelineError::Decode("Image data is empty".into()));
    }
    Ok(image::load_from_memory(bytes)?)
}
