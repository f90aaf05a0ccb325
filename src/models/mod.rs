mod genre_cnn;

pub use genre_cnn::{
    export_placeholder_artifact, GenreCnn, GenreCnnConfig, GenreCnnFactory, OutputActivation,
};
