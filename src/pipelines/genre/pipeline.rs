use super::config::PredictorConfig;
use super::format::{format_predictions, PredictionResult};
use super::invoke::invoke;
use super::labels::LabelSet;
use super::lifecycle::{LoadOutcome, ModelLifecycle, ModelState};
use super::model::{ImageClassificationModel, ModelFactory};
use super::preprocess::{decode_image, ImagePreprocessor};
use crate::error::{PipelineError, Result};
use crate::loaders::{ImageLoader, ImageSource, ModelSource};
use crate::models::GenreCnnFactory;
use crate::pipelines::stats::{PipelineStats, PipelineStatsBuilder};
use crate::pipelines::utils::select_device;
use candle_core::Device;
use image::DynamicImage;
use std::sync::Arc;
use tokio::sync::watch;

/// Classifies images into genres with a lazily loaded model.
///
/// Build one with [`GenrePredictorBuilder`](super::GenrePredictorBuilder) and
/// share it (for example behind an `Arc`) with every caller. The model is
/// loaded once by [`initialize`](Self::initialize) and released by
/// [`dispose`](Self::dispose).
pub struct GenrePredictor<F: ModelFactory = GenreCnnFactory> {
    pub(crate) lifecycle: ModelLifecycle<F::Model>,
    pub(crate) factory: F,
    pub(crate) preprocessor: ImagePreprocessor,
    pub(crate) labels: LabelSet,
    pub(crate) image_loader: ImageLoader,
    pub(crate) inference_gate: tokio::sync::Mutex<()>,
    pub(crate) config: PredictorConfig,
}

impl<F: ModelFactory> GenrePredictor<F> {
    /// Load the model at `location` unless a model is loaded or loading.
    ///
    /// When loading fails an untrained placeholder with the same structure
    /// is installed (reported as [`LoadOutcome::Placeholder`]), unless strict
    /// loading is enabled. An error means no model could be installed.
    pub async fn initialize(&self, location: &str) -> Result<LoadOutcome> {
        match self.lifecycle.state() {
            ModelState::Ready => return Ok(LoadOutcome::AlreadyReady),
            ModelState::Loading => return Ok(LoadOutcome::AlreadyLoading),
            ModelState::Unloaded | ModelState::Disposed => {}
        }

        let device = &select_device(&self.config.backends);
        let source = ModelSource::parse(location);
        let factory = &self.factory;

        let outcome = self
            .lifecycle
            .initialize(
                move || async move {
                    let source = source?;
                    tracing::info!(%source, ?device, "loading genre model");
                    factory.load(&source, device).await
                },
                move || factory.placeholder(device),
                self.config.strict_loading,
            )
            .await?;

        match outcome {
            LoadOutcome::Loaded => tracing::info!(location, "genre model ready"),
            LoadOutcome::Placeholder => tracing::warn!(
                location,
                "genre model ready with untrained placeholder weights, predictions are not meaningful"
            ),
            _ => {}
        }
        Ok(outcome)
    }

    /// [`initialize`](Self::initialize) with the configured model location.
    pub async fn initialize_default(&self) -> Result<LoadOutcome> {
        let location = self.config.model_location.clone();
        self.initialize(&location).await
    }

    /// `true` once a model (real or placeholder) is ready.
    pub fn is_model_loaded(&self) -> bool {
        self.lifecycle.is_ready()
    }

    /// `true` while a load is in flight.
    pub fn is_model_loading(&self) -> bool {
        self.lifecycle.is_loading()
    }

    /// `true` if the ready model is an untrained placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.lifecycle.is_placeholder()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModelState {
        self.lifecycle.state()
    }

    /// Watch lifecycle state changes.
    pub fn subscribe(&self) -> watch::Receiver<ModelState> {
        self.lifecycle.subscribe()
    }

    /// Release the model. A later `initialize` loads it again.
    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }

    /// The labels the predictor reports, as an owned list.
    pub fn available_labels(&self) -> Vec<String> {
        self.labels.to_vec()
    }

    /// The configured label set.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Configuration this predictor was built with.
    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Device of the loaded model, if one is loaded.
    pub fn device(&self) -> Option<Device> {
        self.lifecycle
            .handle()
            .ok()
            .map(|model| model.device().clone())
    }

    /// Wait for a loading model with the configured readiness policy.
    pub async fn wait_until_ready(&self) -> Result<()> {
        self.lifecycle
            .wait_until_ready(self.config.readiness_policy())
            .await
            .map(|_| ())
    }

    /// Predict genres for an already decoded image.
    pub async fn predict_image(&self, image: DynamicImage) -> Result<PredictionResult> {
        let model = self.lifecycle.handle()?;
        let mut stats = PipelineStats::start();
        stats.decoded();
        self.run(model, image, stats).await
    }

    /// Predict genres for encoded image bytes (PNG, JPEG, ...).
    pub async fn predict_from_image(&self, bytes: Vec<u8>) -> Result<PredictionResult> {
        let model = self.lifecycle.handle()?;
        let mut stats = PipelineStats::start();
        let image = decode_blocking(bytes).await?;
        stats.decoded();
        self.run(model, image, stats).await
    }

    /// Predict genres for an image at a path or HTTP(S) URL.
    pub async fn predict_from_image_location(&self, location: &str) -> Result<PredictionResult> {
        let model = self.lifecycle.handle()?;
        let mut stats = PipelineStats::start();
        let source = ImageSource::parse(location)?;
        let bytes = self.image_loader.load(&source).await?;
        let image = decode_blocking(bytes).await?;
        stats.decoded();
        self.run(model, image, stats).await
    }

    /// Wait for the model to become ready, then [`predict_from_image`](Self::predict_from_image).
    pub async fn predict_from_image_when_ready(&self, bytes: Vec<u8>) -> Result<PredictionResult> {
        self.wait_until_ready().await?;
        self.predict_from_image(bytes).await
    }

    /// Wait for the model to become ready, then
    /// [`predict_from_image_location`](Self::predict_from_image_location).
    pub async fn predict_from_image_location_when_ready(
        &self,
        location: &str,
    ) -> Result<PredictionResult> {
        self.wait_until_ready().await?;
        self.predict_from_image_location(location).await
    }

    async fn run(
        &self,
        model: Arc<F::Model>,
        image: DynamicImage,
        mut stats: PipelineStatsBuilder,
    ) -> Result<PredictionResult> {
        let preprocessor = self.preprocessor;
        let raw = {
            let _gate = self.inference_gate.lock().await;
            tokio::task::spawn_blocking(move || {
                let input = preprocessor.preprocess(&image, model.device())?;
                drop(image);
                invoke(model.as_ref(), input)
            })
            .await
            .map_err(|e| PipelineError::Inference(format!("Inference task failed: {e}")))??
        };
        stats.inferred();

        if raw.len() != self.labels.len() {
            return Err(PipelineError::Inference(format!(
                "Model produced {} scores for {} labels",
                raw.len(),
                self.labels.len()
            )));
        }

        let predictions = format_predictions(&self.labels, &raw);
        let stats = stats.finish();
        tracing::debug!(
            decode_ms = stats.decode_time.as_secs_f64() * 1000.0,
            inference_ms = stats.inference_time.as_secs_f64() * 1000.0,
            total_ms = stats.total_ms(),
            top = predictions.first().map(|p| p.label.as_str()),
            "prediction finished"
        );

        Ok(PredictionResult {
            predictions,
            processing_time_ms: stats.total_ms(),
        })
    }
}

async fn decode_blocking(bytes: Vec<u8>) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || decode_image(&bytes))
        .await
        .map_err(|e| PipelineError::Decode(format!("Image decoding task failed: {e}")))?
}
