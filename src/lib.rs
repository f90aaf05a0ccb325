//! Anime genre prediction from images, running locally on Candle.
//!
//! Powered by [Candle](https://github.com/huggingface/candle). A small
//! convolutional classifier is loaded once from a local path, an HTTP(S) URL
//! or the Hugging Face Hub, then scores every image against a fixed list of
//! genres.
//!
//! ```rust,no_run
//! use genre_predictor::GenrePredictorBuilder;
//!
//! # async fn example() -> genre_predictor::error::Result<()> {
//! genre_predictor::init_tracing();
//!
//! let predictor = GenrePredictorBuilder::new().build()?;
//! predictor.initialize("hf://acme/anime-genres").await?;
//!
//! let result = predictor
//!     .predict_from_image_location("https://example.com/cover.jpg")
//!     .await?;
//! if let Some(top) = result.top() {
//!     println!("{} ({:.1}%)", top.label, top.confidence * 100.0);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

// ============ Internal API ============

pub(crate) mod loaders;
pub(crate) mod models;
pub(crate) mod pipelines;

mod logging;

// ============ Public API ============

pub mod error;

pub use logging::init_tracing;
pub use pipelines::genre;

pub use genre::{
    GenrePredictor, GenrePredictorBuilder, LoadOutcome, ModelState, Prediction, PredictionResult,
    PredictorConfig,
};
pub use loaders::{ArtifactLoader, ImageSource, ModelSource, WeightData};
pub use models::{
    export_placeholder_artifact, GenreCnn, GenreCnnConfig, GenreCnnFactory, OutputActivation,
};
pub use pipelines::utils::{select_device, BackendCandidate};
