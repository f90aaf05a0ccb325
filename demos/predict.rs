use genre_predictor::error::Result;
use genre_predictor::{GenrePredictorBuilder, LoadOutcome, PredictorConfig};

// Usage: cargo run --example predict -- <image path or URL> [model location] [config.json]
#[tokio::main]
async fn main() -> Result<()> {
    genre_predictor::init_tracing();

    let mut args = std::env::args().skip(1);
    let image = args.next().unwrap_or_else(|| "cover.png".to_string());
    let model = args.next();
    let config = match args.next() {
        Some(path) => PredictorConfig::from_file(path)?,
        None => PredictorConfig::default(),
    };

    println!("Building predictor...");
    let mut builder = GenrePredictorBuilder::from_config(config);
    if let Some(model) = model {
        builder = builder.model_location(model);
    }
    let predictor = builder.build()?;

    match predictor.initialize_default().await? {
        LoadOutcome::Placeholder => {
            println!("Model not found, using untrained placeholder weights.")
        }
        outcome => println!("Model ready ({outcome:?}) on {:?}", predictor.device()),
    }

    let result = predictor
        .predict_from_image_location_when_ready(&image)
        .await?;

    println!("\n=== Genre Predictions for {image} ===");
    for prediction in &result.predictions {
        println!(
            "{:<15} {:>6.2}%",
            prediction.label,
            prediction.confidence * 100.0
        );
    }
    println!("Completed in {:.2}ms", result.processing_time_ms);

    predictor.dispose();
    Ok(())
}
