//! Integration tests for loading genre CNN artifacts from disk.
//! Run with: cargo test --test artifacts

use genre_predictor::error::{PipelineError, Result};
use genre_predictor::genre::{LoadOutcome, ModelState, ANIME_GENRES};
use genre_predictor::{
    export_placeholder_artifact, GenreCnnConfig, GenrePredictorBuilder, PredictorConfig,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::HashSet;
use std::path::Path;

const SIZE: u32 = 32;

fn small_config() -> GenreCnnConfig {
    GenreCnnConfig {
        input_size: SIZE as usize,
        conv_filters: 4,
        hidden_units: 16,
        num_labels: ANIME_GENRES.len(),
        labels: Some(ANIME_GENRES.iter().map(|l| l.to_string()).collect()),
        ..Default::default()
    }
}

fn write_png(dir: &Path, name: &str) -> Result<String> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 20, Rgba([10, 120, 240, 128])));
    let path = dir.join(name);
    image.save_with_format(&path, ImageFormat::Png)?;
    Ok(path.display().to_string())
}

fn assert_well_formed(predictions: &[genre_predictor::Prediction]) {
    assert_eq!(predictions.len(), ANIME_GENRES.len());

    let labels: HashSet<&str> = predictions.iter().map(|p| p.label.as_str()).collect();
    let expected: HashSet<&str> = ANIME_GENRES.iter().copied().collect();
    assert_eq!(labels, expected);

    assert!(predictions
        .iter()
        .all(|p| (0.0..=1.0).contains(&p.confidence)));
    assert!(predictions
        .windows(2)
        .all(|pair| pair[0].confidence >= pair[1].confidence));
}

#[tokio::test]
async fn loads_exported_artifact_and_predicts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let description = export_placeholder_artifact(&small_config(), dir.path())?;
    let image = write_png(dir.path(), "cover.png")?;

    let predictor = GenrePredictorBuilder::new().input_size(SIZE).cpu().build()?;
    let outcome = predictor
        .initialize(&description.display().to_string())
        .await?;

    assert_eq!(outcome, LoadOutcome::Loaded);
    assert!(!predictor.is_placeholder());

    let result = predictor.predict_from_image_location(&image).await?;
    assert_well_formed(&result.predictions);

    // softmax output, so the clamped scores still sum to one
    let total: f32 = result.predictions.iter().map(|p| p.confidence).sum();
    assert!((total - 1.0).abs() < 1e-3);
    Ok(())
}

#[tokio::test]
async fn directory_location_resolves_to_model_json() -> Result<()> {
    let dir = tempfile::tempdir()?;
    export_placeholder_artifact(&small_config(), dir.path())?;

    let predictor = GenrePredictorBuilder::new().input_size(SIZE).cpu().build()?;
    let outcome = predictor
        .initialize(&dir.path().display().to_string())
        .await?;

    assert_eq!(outcome, LoadOutcome::Loaded);
    Ok(())
}

#[tokio::test]
async fn missing_artifact_uses_placeholder_network() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("nothing-here").join("model.json");

    let predictor = GenrePredictorBuilder::new().input_size(SIZE).cpu().build()?;
    let outcome = predictor.initialize(&missing.display().to_string()).await?;

    assert_eq!(outcome, LoadOutcome::Placeholder);
    assert!(predictor.is_model_loaded());
    assert!(predictor.is_placeholder());

    let image = write_png(dir.path(), "cover.png")?;
    let bytes = std::fs::read(image)?;
    let result = predictor.predict_from_image(bytes).await?;
    assert_well_formed(&result.predictions);
    Ok(())
}

#[tokio::test]
async fn missing_weights_are_a_load_failure() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let description = export_placeholder_artifact(&small_config(), dir.path())?;
    std::fs::remove_file(dir.path().join("model.safetensors"))?;

    let predictor = GenrePredictorBuilder::new()
        .input_size(SIZE)
        .cpu()
        .strict_loading(true)
        .build()?;
    let result = predictor
        .initialize(&description.display().to_string())
        .await;

    assert!(matches!(result, Err(PipelineError::Load(_))));
    assert_eq!(predictor.state(), ModelState::Unloaded);
    Ok(())
}

#[tokio::test]
async fn incompatible_artifact_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = GenreCnnConfig {
        num_labels: 3,
        labels: None,
        ..small_config()
    };
    let description = export_placeholder_artifact(&config, dir.path())?;
    let location = description.display().to_string();

    let strict = GenrePredictorBuilder::new()
        .input_size(SIZE)
        .cpu()
        .strict_loading(true)
        .build()?;
    assert!(matches!(
        strict.initialize(&location).await,
        Err(PipelineError::Load(_))
    ));

    let lenient = GenrePredictorBuilder::new().input_size(SIZE).cpu().build()?;
    assert_eq!(lenient.initialize(&location).await?, LoadOutcome::Placeholder);
    Ok(())
}

#[tokio::test]
async fn config_file_drives_initialize_default() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let description = export_placeholder_artifact(&small_config(), dir.path())?;

    let config_path = dir.path().join("predictor.json");
    let json = serde_json::json!({
        "model_location": description.display().to_string(),
        "input_size": SIZE,
        "backends": ["cpu"],
        "strict_loading": true,
    });
    std::fs::write(&config_path, json.to_string())?;

    let config = PredictorConfig::from_file(&config_path)?;
    let predictor = GenrePredictorBuilder::from_config(config).build()?;

    assert_eq!(predictor.initialize_default().await?, LoadOutcome::Loaded);
    assert!(predictor.config().strict_loading);
    Ok(())
}

#[tokio::test]
async fn missing_image_file_is_a_decode_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let predictor = GenrePredictorBuilder::new().input_size(SIZE).cpu().build()?;
    predictor
        .initialize(&dir.path().join("absent.json").display().to_string())
        .await?;

    let missing = dir.path().join("absent.png").display().to_string();
    let result = predictor.predict_from_image_location(&missing).await;
    assert!(matches!(result, Err(PipelineError::Decode(_))));
    Ok(())
}
