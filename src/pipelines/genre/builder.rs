use super::config::{millis_rounded_up, PredictorConfig, ReadinessConfig};
use super::labels::LabelSet;
use super::lifecycle::{ModelLifecycle, ReadinessPolicy};
use super::model::ModelFactory;
use super::pipeline::GenrePredictor;
use super::preprocess::ImagePreprocessor;
use crate::error::Result;
use crate::loaders::{http_client, ArtifactLoader, ImageLoader};
use crate::models::GenreCnnFactory;
use crate::pipelines::utils::BackendCandidate;
use tokio::time::Duration;

// What a factory may need from the finished configuration.
struct FactoryParts {
    loader: ArtifactLoader,
    labels: LabelSet,
    input_size: usize,
}

type MakeFactory<F> = Box<dyn FnOnce(FactoryParts) -> F + Send>;

/// Builder for creating [`GenrePredictor`] instances.
///
/// Building does not load anything; call
/// [`initialize`](GenrePredictor::initialize) afterwards.
///
/// # Example
///
/// ```rust,no_run
/// use genre_predictor::GenrePredictorBuilder;
///
/// # async fn example() -> genre_predictor::error::Result<()> {
/// let predictor = GenrePredictorBuilder::new()
///     .model_location("models/anime/model.json")
///     .cpu()
///     .build()?;
/// predictor.initialize_default().await?;
/// # Ok(())
/// # }
/// ```
pub struct GenrePredictorBuilder<F = GenreCnnFactory> {
    config: PredictorConfig,
    make_factory: MakeFactory<F>,
}

impl Default for GenrePredictorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GenrePredictorBuilder {
    /// Create a builder with the anime genre defaults.
    ///
    /// - model location: `models/model.json`
    /// - labels: the ten anime genres
    /// - input size: 224
    /// - backends: `cuda:0`, `metal:0`, `cpu`
    /// - readiness wait: 50 x 100 ms
    pub fn new() -> Self {
        Self::from_config(PredictorConfig::default())
    }

    /// Start from a loaded [`PredictorConfig`].
    pub fn from_config(config: PredictorConfig) -> Self {
        Self {
            config,
            make_factory: Box::new(|parts: FactoryParts| {
                GenreCnnFactory::new(parts.loader, parts.labels, parts.input_size)
            }),
        }
    }
}

impl<F: ModelFactory> GenrePredictorBuilder<F> {
    /// Location used by [`initialize_default`](GenrePredictor::initialize_default).
    pub fn model_location(mut self, location: impl Into<String>) -> Self {
        self.config.model_location = location.into();
        self
    }

    /// Output labels, in the order of the model's output vector.
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Side length of the square model input (default: 224).
    pub fn input_size(mut self, size: u32) -> Self {
        self.config.input_size = size;
        self
    }

    /// Backends to try, in order. CPU is used if all of them fail.
    pub fn backends(mut self, backends: impl IntoIterator<Item = BackendCandidate>) -> Self {
        self.config.backends = backends.into_iter().collect();
        self
    }

    /// Run on CPU only.
    pub fn cpu(self) -> Self {
        self.backends([BackendCandidate::Cpu])
    }

    /// Prefer a CUDA GPU, falling back to CPU.
    ///
    /// Requires the `cuda` feature to actually use the GPU.
    pub fn cuda(self, device_id: usize) -> Self {
        self.backends([BackendCandidate::Cuda(device_id), BackendCandidate::Cpu])
    }

    /// Prefer a Metal GPU, falling back to CPU.
    ///
    /// Requires the `metal` feature to actually use the GPU.
    pub fn metal(self, device_id: usize) -> Self {
        self.backends([BackendCandidate::Metal(device_id), BackendCandidate::Cpu])
    }

    /// How long the `*_when_ready` operations wait for a loading model.
    pub fn readiness_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.config.readiness = ReadinessConfig::from(policy);
        self
    }

    /// Fail `initialize` on load errors instead of installing an untrained model.
    pub fn strict_loading(mut self, strict: bool) -> Self {
        self.config.strict_loading = strict;
        self
    }

    /// Timeout for HTTP fetches of models and images (default: 30 s).
    ///
    /// Kept at millisecond precision; fractions round up.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout_ms = millis_rounded_up(timeout);
        self
    }

    /// Use a custom model factory.
    pub fn factory<G: ModelFactory>(self, factory: G) -> GenrePredictorBuilder<G> {
        GenrePredictorBuilder {
            config: self.config,
            make_factory: Box::new(move |_| factory),
        }
    }

    /// Validate the configuration and build the predictor.
    pub fn build(self) -> Result<GenrePredictor<F>> {
        self.config.validate()?;
        let labels = self.config.label_set()?;
        let preprocessor = ImagePreprocessor::new(self.config.input_size)?;

        let client = http_client(self.config.fetch_timeout())?;
        let factory = (self.make_factory)(FactoryParts {
            loader: ArtifactLoader::with_client(client.clone()),
            labels: labels.clone(),
            input_size: preprocessor.size() as usize,
        });

        tracing::debug!(
            labels = labels.len(),
            input_size = preprocessor.size(),
            backends = ?self.config.backends,
            "built genre predictor"
        );

        Ok(GenrePredictor {
            lifecycle: ModelLifecycle::new(),
            factory,
            preprocessor,
            labels,
            image_loader: ImageLoader::with_client(client),
            inference_gate: tokio::sync::Mutex::new(()),
            config: self.config,
        })
    }
}
