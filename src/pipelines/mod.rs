pub mod genre;
pub mod stats;
pub mod utils;
