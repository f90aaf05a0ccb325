use crate::error::{PipelineError, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Genres predicted by the reference anime model, in output order.
pub const ANIME_GENRES: [&str; 10] = [
    "Action",
    "Adventure",
    "Comedy",
    "Drama",
    "Fantasy",
    "Horror",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Slice of Life",
];

/// Ordered labels for the model's output vector.
///
/// Index `i` of the model output scores label `i`. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Arc<[String]>,
}

impl LabelSet {
    /// Create a label set. Labels must be non-empty and unique.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(PipelineError::Config("Label set cannot be empty".into()));
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if label.trim().is_empty() {
                return Err(PipelineError::Config("Labels cannot be blank".into()));
            }
            if !seen.insert(label.as_str()) {
                return Err(PipelineError::Config(format!("Duplicate label '{label}'")));
            }
        }

        Ok(Self {
            labels: labels.into(),
        })
    }

    /// The ten anime genres of the reference deployment.
    pub fn anime_genres() -> Self {
        Self {
            labels: ANIME_GENRES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Number of labels (equals the model's output size).
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always `false` for a constructed set; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for an output index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Iterate labels in output order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Owned copy of the labels.
    pub fn to_vec(&self) -> Vec<String> {
        self.labels.to_vec()
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::anime_genres()
    }
}
