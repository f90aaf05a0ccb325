//! Genre prediction from images.
//!
//! A [`GenrePredictor`] owns one image classification model, loaded lazily
//! from a model artifact and shared by every prediction. Each prediction
//! decodes the image, stretches it to the model's square input, runs the
//! forward pass and returns one confidence per genre, sorted from most to
//! least likely.
//!
//! ## Main Types
//!
//! - [`GenrePredictor`] - the prediction service
//! - [`GenrePredictorBuilder`] - builder for predictor configuration
//! - [`PredictorConfig`] - serde configuration, loadable from JSON
//! - [`ModelFactory`] / [`ImageClassificationModel`] - seams for custom models
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use genre_predictor::genre::*;
//!
//! # async fn example() -> genre_predictor::error::Result<()> {
//! let predictor = GenrePredictorBuilder::new()
//!     .model_location("models/anime/model.json")
//!     .build()?;
//!
//! match predictor.initialize_default().await? {
//!     LoadOutcome::Placeholder => eprintln!("model missing, using untrained weights"),
//!     _ => {}
//! }
//!
//! let bytes = std::fs::read("cover.png")?;
//! let result = predictor.predict_from_image(bytes).await?;
//! for prediction in &result.predictions {
//!     println!("{}: {:.3}", prediction.label, prediction.confidence);
//! }
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod format;
mod invoke;
mod labels;
mod lifecycle;
mod model;
mod pipeline;
mod preprocess;

pub use builder::GenrePredictorBuilder;
pub use config::{PredictorConfig, ReadinessConfig, DEFAULT_MODEL_LOCATION};
pub use format::{format_predictions, Prediction, PredictionResult};
pub use invoke::invoke;
pub use labels::{LabelSet, ANIME_GENRES};
pub use lifecycle::{LoadOutcome, ModelLifecycle, ModelState, ReadinessPolicy};
pub use model::{ImageClassificationModel, ModelFactory};
pub use pipeline::GenrePredictor;
pub use preprocess::{decode_image, ImagePreprocessor, DEFAULT_INPUT_SIZE};

pub use crate::error::Result;
