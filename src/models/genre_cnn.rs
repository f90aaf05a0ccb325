use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{conv2d, linear, ops, Conv2d, Conv2dConfig, Linear, VarBuilder, VarMap};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::loaders::{ArtifactLoader, ModelSource, WeightData};
use crate::pipelines::genre::{ImageClassificationModel, LabelSet, ModelFactory};

/// Activation applied to the final layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Scores sum to 1.
    #[default]
    Softmax,
    /// Independent per-label probabilities.
    Sigmoid,
    /// Raw logits (clamped later by the formatter).
    Linear,
}

/// Description of a genre CNN artifact (`model.json`).
///
/// Every field has a default, so `{}` describes the reference network:
/// conv(8 filters, 3x3, same padding) + ReLU, 2x2 max-pool, dense(64) + ReLU,
/// dense(10) + softmax over a 224x224 RGB input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenreCnnConfig {
    /// Side length of the square input image.
    pub input_size: usize,
    /// Number of convolution filters.
    pub conv_filters: usize,
    /// Convolution kernel size (odd).
    pub kernel_size: usize,
    /// Max-pool window and stride.
    pub pool_size: usize,
    /// Width of the hidden dense layer.
    pub hidden_units: usize,
    /// Number of output labels.
    pub num_labels: usize,
    /// Final activation.
    pub output_activation: OutputActivation,
    /// Safetensors file, relative to the description.
    pub weights: String,
    /// Labels the model was trained with, if recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl Default for GenreCnnConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            conv_filters: 8,
            kernel_size: 3,
            pool_size: 2,
            hidden_units: 64,
            num_labels: 10,
            output_activation: OutputActivation::Softmax,
            weights: "model.safetensors".into(),
            labels: None,
        }
    }
}

impl GenreCnnConfig {
    /// Parse a JSON description.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PipelineError::Load(format!("Invalid model description: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the described network can be built.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("input_size", self.input_size),
            ("conv_filters", self.conv_filters),
            ("kernel_size", self.kernel_size),
            ("pool_size", self.pool_size),
            ("hidden_units", self.hidden_units),
            ("num_labels", self.num_labels),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| *v == 0) {
            return Err(PipelineError::Load(format!("Model description: {name} must be positive")));
        }
        if self.kernel_size % 2 == 0 {
            return Err(PipelineError::Load(format!(
                "Model description: kernel_size must be odd, got {}",
                self.kernel_size
            )));
        }
        if self.pool_size > self.input_size {
            return Err(PipelineError::Load(format!(
                "Model description: pool_size {} exceeds input_size {}",
                self.pool_size, self.input_size
            )));
        }
        if let Some(labels) = &self.labels {
            if labels.len() != self.num_labels {
                return Err(PipelineError::Load(format!(
                    "Model description lists {} labels but num_labels is {}",
                    labels.len(),
                    self.num_labels
                )));
            }
        }
        Ok(())
    }

    fn flattened_features(&self) -> usize {
        let pooled = self.input_size / self.pool_size;
        pooled * pooled * self.conv_filters
    }
}

/// Small convolutional genre classifier.
pub struct GenreCnn {
    conv: Conv2d,
    hidden: Linear,
    output: Linear,
    config: GenreCnnConfig,
    device: Device,
}

impl GenreCnn {
    /// Build the network from weights (`conv.*`, `hidden.*`, `output.*`).
    pub fn load(config: GenreCnnConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;

        let conv_config = Conv2dConfig {
            padding: config.kernel_size / 2,
            ..Default::default()
        };
        let conv = conv2d(
            3,
            config.conv_filters,
            config.kernel_size,
            conv_config,
            vb.pp("conv"),
        )?;
        let hidden = linear(config.flattened_features(), config.hidden_units, vb.pp("hidden"))?;
        let output = linear(config.hidden_units, config.num_labels, vb.pp("output"))?;

        Ok(Self {
            conv,
            hidden,
            output,
            device: vb.device().clone(),
            config,
        })
    }

    /// Build an untrained network with freshly initialized weights.
    pub fn placeholder(config: GenreCnnConfig, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        Self::load(config, vb)
    }

    /// Description this network was built from.
    pub fn config(&self) -> &GenreCnnConfig {
        &self.config
    }
}

impl ImageClassificationModel for GenreCnn {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        // NHWC in, conv wants NCHW
        let x = input.permute((0, 3, 1, 2))?.contiguous()?;
        let x = self.conv.forward(&x)?.relu()?;
        let x = x.max_pool2d(self.config.pool_size)?;
        // flatten in NHWC order to match the dense layer's weight layout
        let x = x.permute((0, 2, 3, 1))?.contiguous()?.flatten_from(1)?;
        let x = self.hidden.forward(&x)?.relu()?;
        let logits = self.output.forward(&x)?;

        let scores = match self.config.output_activation {
            OutputActivation::Softmax => ops::softmax(&logits, D::Minus1)?,
            OutputActivation::Sigmoid => ops::sigmoid(&logits)?,
            OutputActivation::Linear => logits,
        };
        Ok(scores)
    }

    fn input_size(&self) -> usize {
        self.config.input_size
    }

    fn num_labels(&self) -> usize {
        self.config.num_labels
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Write an untrained artifact (description plus weights) into `dir`.
///
/// Returns the path of the description, usable as a model location.
pub fn export_placeholder_artifact(config: &GenreCnnConfig, dir: &Path) -> Result<PathBuf> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    GenreCnn::load(config.clone(), vb)?;

    std::fs::create_dir_all(dir)?;
    varmap.save(dir.join(&config.weights))?;

    let description = dir.join(crate::loaders::DEFAULT_DESCRIPTION_FILE);
    std::fs::write(&description, serde_json::to_string_pretty(config)?)?;
    Ok(description)
}

/// Production [`ModelFactory`]: reads genre CNN artifacts.
#[derive(Debug, Clone)]
pub struct GenreCnnFactory {
    loader: ArtifactLoader,
    labels: LabelSet,
    input_size: usize,
}

impl GenreCnnFactory {
    /// Create a factory for models matching `labels` and `input_size`.
    pub fn new(loader: ArtifactLoader, labels: LabelSet, input_size: usize) -> Self {
        Self {
            loader,
            labels,
            input_size,
        }
    }

    fn expected_config(&self) -> GenreCnnConfig {
        GenreCnnConfig {
            input_size: self.input_size,
            num_labels: self.labels.len(),
            labels: Some(self.labels.to_vec()),
            ..Default::default()
        }
    }

    fn check_compatible(&self, config: &GenreCnnConfig) -> Result<()> {
        if config.num_labels != self.labels.len() {
            return Err(PipelineError::Load(format!(
                "Model predicts {} labels, label set has {}",
                config.num_labels,
                self.labels.len()
            )));
        }
        if config.input_size != self.input_size {
            return Err(PipelineError::Load(format!(
                "Model expects {0}x{0} input, preprocessor produces {1}x{1}",
                config.input_size, self.input_size
            )));
        }
        if let Some(labels) = &config.labels {
            if !labels.iter().map(String::as_str).eq(self.labels.iter()) {
                tracing::warn!(
                    model_labels = ?labels,
                    "model was trained with different label names, using configured labels"
                );
            }
        }
        Ok(())
    }
}

impl ModelFactory for GenreCnnFactory {
    type Model = GenreCnn;

    fn load<'a>(
        &'a self,
        source: &'a ModelSource,
        device: &'a Device,
    ) -> BoxFuture<'a, Result<GenreCnn>> {
        Box::pin(async move {
            let description = self.loader.read_description(source).await?;
            let config = GenreCnnConfig::from_json(&description)?;
            self.check_compatible(&config)?;

            let weights = self.loader.read_weights(source, &config.weights).await?;
            let vb = match weights {
                // SAFETY: the weight file must not be modified while mapped.
                WeightData::File(path) => unsafe {
                    VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)
                },
                WeightData::Bytes(bytes) => {
                    VarBuilder::from_buffered_safetensors(bytes, DType::F32, device)
                }
            }
            .map_err(|e| PipelineError::Load(format!("Failed to read weights: {e}")))?;

            GenreCnn::load(config, vb)
                .map_err(|e| PipelineError::Load(format!("Weights do not match description: {e}")))
        })
    }

    fn placeholder(&self, device: &Device) -> Result<GenreCnn> {
        GenreCnn::placeholder(self.expected_config(), device)
    }
}
