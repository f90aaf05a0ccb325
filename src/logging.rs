/// Installs a global tracing subscriber for logging.
///
/// Filtering follows `RUST_LOG` (e.g. `RUST_LOG=genre_predictor=debug`).
/// Libraries should leave this to the application; it exists for demos and
/// small binaries that have no subscriber of their own.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
