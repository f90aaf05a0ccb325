use crate::error::Result;
use crate::loaders::ModelSource;
use candle_core::{Device, Tensor};
use futures::future::BoxFuture;

/// A model that maps a `[1, S, S, 3]` image tensor to one score per label.
pub trait ImageClassificationModel: Send + Sync + 'static {
    /// Run the forward pass. Output holds `num_labels()` values.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Side length `S` of the square input image.
    fn input_size(&self) -> usize;

    /// Length of the output vector.
    fn num_labels(&self) -> usize;

    /// Device the weights live on.
    fn device(&self) -> &Device;
}

/// Creates models for the prediction service.
///
/// `load` reads a real artifact; `placeholder` builds an untrained model with
/// the same structure, used when loading fails and strict loading is off.
pub trait ModelFactory: Send + Sync + 'static {
    /// Model type produced by this factory.
    type Model: ImageClassificationModel;

    /// Load a model artifact from `source` onto `device`.
    fn load<'a>(
        &'a self,
        source: &'a ModelSource,
        device: &'a Device,
    ) -> BoxFuture<'a, Result<Self::Model>>;

    /// Build a structurally valid, untrained model on `device`.
    fn placeholder(&self, device: &Device) -> Result<Self::Model>;
}
