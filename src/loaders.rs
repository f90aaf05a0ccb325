use crate::error::{PipelineError, Result};
use reqwest::Url;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

/// File name used when a model location points at a directory or hub repo.
pub const DEFAULT_DESCRIPTION_FILE: &str = "model.json";

/// Where a model artifact lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Description file on the local filesystem.
    Local(PathBuf),
    /// Description served over HTTP(S).
    Remote(Url),
    /// File inside a Hugging Face Hub model repository.
    Hub {
        /// Repository id, `owner/name`.
        repo: String,
        /// Path of the description file inside the repository.
        file: String,
    },
}

impl ModelSource {
    /// Parse a model location.
    ///
    /// `http(s)://` URLs are remote, `hf://owner/name[/file]` points into the
    /// Hub, `file://` URLs and everything else are local paths.
    pub fn parse(location: &str) -> Result<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(PipelineError::Load("Model location is empty".into()));
        }

        if let Some(rest) = location.strip_prefix("hf://") {
            let mut parts = rest.splitn(3, '/');
            let owner = parts.next().unwrap_or_default();
            let name = parts.next().unwrap_or_default();
            if owner.is_empty() || name.is_empty() {
                return Err(PipelineError::Load(format!(
                    "Invalid hub location '{location}', expected hf://owner/name[/file]"
                )));
            }
            let file = parts
                .next()
                .filter(|f| !f.is_empty())
                .unwrap_or(DEFAULT_DESCRIPTION_FILE);
            return Ok(ModelSource::Hub {
                repo: format!("{owner}/{name}"),
                file: file.to_string(),
            });
        }

        if is_http(location) {
            let url = Url::parse(location)
                .map_err(|e| PipelineError::Load(format!("Invalid model URL '{location}': {e}")))?;
            return Ok(ModelSource::Remote(url));
        }

        Ok(ModelSource::Local(local_path(location).map_err(PipelineError::Load)?))
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Local(path) => write!(f, "{}", path.display()),
            ModelSource::Remote(url) => write!(f, "{url}"),
            ModelSource::Hub { repo, file } => write!(f, "hf://{repo}/{file}"),
        }
    }
}

/// Weight data of a fetched artifact.
#[derive(Debug)]
pub enum WeightData {
    /// Safetensors file on disk (memory-mapped when loaded).
    File(PathBuf),
    /// Safetensors content downloaded into memory.
    Bytes(Vec<u8>),
}

/// Fetches model descriptions and weight files from any [`ModelSource`].
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    client: reqwest::Client,
}

impl ArtifactLoader {
    /// Create a loader whose HTTP requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }

    pub(crate) fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Read the JSON model description.
    pub async fn read_description(&self, source: &ModelSource) -> Result<String> {
        match source {
            ModelSource::Local(path) => {
                let path = resolve_local_description(path).await;
                tokio::fs::read_to_string(&path).await.map_err(|e| {
                    PipelineError::Load(format!(
                        "Failed to read model description '{}': {e}",
                        path.display()
                    ))
                })
            }
            ModelSource::Remote(url) => {
                let response = self.client.get(url.clone()).send().await?;
                Ok(response.error_for_status()?.text().await?)
            }
            ModelSource::Hub { repo, file } => {
                let path = HfLoader::new(repo, file).load().await?;
                tokio::fs::read_to_string(&path).await.map_err(|e| {
                    PipelineError::Load(format!(
                        "Failed to read model description '{}': {e}",
                        path.display()
                    ))
                })
            }
        }
    }

    /// Fetch the weight file named `relative` next to the description.
    pub async fn read_weights(&self, source: &ModelSource, relative: &str) -> Result<WeightData> {
        match source {
            ModelSource::Local(path) => {
                let description = resolve_local_description(path).await;
                let base = description.parent().unwrap_or_else(|| Path::new("."));
                let weights = base.join(relative);
                if !tokio::fs::try_exists(&weights).await.unwrap_or(false) {
                    return Err(PipelineError::Load(format!(
                        "Weight file '{}' not found",
                        weights.display()
                    )));
                }
                Ok(WeightData::File(weights))
            }
            ModelSource::Remote(url) => {
                let weights_url = url.join(relative).map_err(|e| {
                    PipelineError::Load(format!("Invalid weights path '{relative}': {e}"))
                })?;
                let response = self.client.get(weights_url).send().await?;
                let bytes = response.error_for_status()?.bytes().await?;
                Ok(WeightData::Bytes(bytes.to_vec()))
            }
            ModelSource::Hub { repo, file } => {
                let sibling = match file.rsplit_once('/') {
                    Some((dir, _)) => format!("{dir}/{relative}"),
                    None => relative.to_string(),
                };
                let path = HfLoader::new(repo, &sibling).load().await?;
                Ok(WeightData::File(path))
            }
        }
    }
}

/// Where an input image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Image file on the local filesystem.
    Local(PathBuf),
    /// Image served over HTTP(S).
    Remote(Url),
}

impl ImageSource {
    /// Parse an image location: `http(s)://` URLs are remote, anything else is a path.
    pub fn parse(location: &str) -> Result<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(PipelineError::Decode("Image location is empty".into()));
        }

        if is_http(location) {
            let url = Url::parse(location)
                .map_err(|e| PipelineError::Decode(format!("Invalid image URL '{location}': {e}")))?;
            return Ok(ImageSource::Remote(url));
        }

        Ok(ImageSource::Local(local_path(location).map_err(PipelineError::Decode)?))
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Local(path) => write!(f, "{}", path.display()),
            ImageSource::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// Reads encoded image bytes from an [`ImageSource`].
#[derive(Debug, Clone)]
pub struct ImageLoader {
    client: reqwest::Client,
}

impl ImageLoader {
    pub(crate) fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch the raw bytes. Every failure is reported as a decode error.
    pub async fn load(&self, source: &ImageSource) -> Result<Vec<u8>> {
        match source {
            ImageSource::Local(path) => tokio::fs::read(path).await.map_err(|e| {
                PipelineError::Decode(format!("Failed to read image '{}': {e}", path.display()))
            }),
            ImageSource::Remote(url) => {
                let fetch = async {
                    let response = self.client.get(url.clone()).send().await?;
                    response.error_for_status()?.bytes().await
                };
                fetch.await.map(|b| b.to_vec()).map_err(|e| {
                    PipelineError::Decode(format!("Failed to read image from URL '{url}': {e}"))
                })
            }
        }
    }
}

// Downloads a single file from a Hugging Face Hub repository into the local cache.
#[derive(Debug, Clone)]
pub(crate) struct HfLoader {
    repo: String,
    filename: String,
}

impl HfLoader {
    pub(crate) fn new(repo: &str, filename: &str) -> Self {
        Self {
            repo: repo.into(),
            filename: filename.into(),
        }
    }

    pub(crate) async fn load(&self) -> Result<PathBuf> {
        let hf_api = hf_hub::api::tokio::ApiBuilder::new()
            .with_chunk_size(None)
            .build()
            .map_err(|e| {
                PipelineError::Download(format!("Failed to initialize HuggingFace API: {e}"))
            })?;
        let hf_api = hf_api.model(self.repo.clone());

        let max_retries = 3;
        let mut attempts = 0u32;

        for attempt in 0..max_retries {
            match hf_api.get(self.filename.as_str()).await {
                Ok(path) => return Ok(path),
                Err(e) => {
                    let error_msg = e.to_string();
                    attempts = attempt + 1;
                    if error_msg.contains("Lock acquisition failed") && attempt < max_retries - 1 {
                        let wait_time = Duration::from_millis(100 * (1 << attempt));
                        tokio::time::sleep(wait_time).await;
                        continue;
                    }
                    return Err(PipelineError::Download(format!(
                        "Failed to download '{}' from '{}': {}",
                        self.filename, self.repo, error_msg
                    )));
                }
            }
        }

        Err(PipelineError::Download(format!(
            "Download timed out for '{}' from '{}' after {} attempt(s)",
            self.filename, self.repo, attempts
        )))
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {e}")))
}

fn is_http(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn local_path(location: &str) -> std::result::Result<PathBuf, String> {
    if location.starts_with("file://") {
        let url = Url::parse(location).map_err(|e| format!("Invalid file URL '{location}': {e}"))?;
        return url
            .to_file_path()
            .map_err(|_| format!("File URL '{location}' has no local path"));
    }
    Ok(PathBuf::from(location))
}

async fn resolve_local_description(path: &Path) -> PathBuf {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => path.join(DEFAULT_DESCRIPTION_FILE),
        _ => path.to_path_buf(),
    }
}
