use crate::error::{PipelineError, Result};
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A compute backend to try when selecting the device for a model.
///
/// Candidates are tried in order; the first one that initializes wins.
/// Written as `"cuda:0"`, `"metal:0"` or `"cpu"` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendCandidate {
    /// CUDA GPU with the given ordinal.
    Cuda(usize),
    /// Metal GPU with the given ordinal.
    Metal(usize),
    /// Plain CPU execution. Always available.
    Cpu,
}

impl BackendCandidate {
    /// Default order: accelerated backends first, CPU as the baseline.
    pub fn default_order() -> Vec<BackendCandidate> {
        vec![
            BackendCandidate::Cuda(0),
            BackendCandidate::Metal(0),
            BackendCandidate::Cpu,
        ]
    }

    fn open(self) -> Result<Device> {
        match self {
            BackendCandidate::Cpu => Ok(Device::Cpu),
            BackendCandidate::Cuda(i) => Device::new_cuda(i).map_err(|e| {
                PipelineError::Device(format!("Failed to init CUDA device {i}: {e}"))
            }),
            BackendCandidate::Metal(i) => Device::new_metal(i).map_err(|e| {
                PipelineError::Device(format!("Failed to init Metal device {i}: {e}"))
            }),
        }
    }
}

impl fmt::Display for BackendCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendCandidate::Cuda(i) => write!(f, "cuda:{i}"),
            BackendCandidate::Metal(i) => write!(f, "metal:{i}"),
            BackendCandidate::Cpu => write!(f, "cpu"),
        }
    }
}

impl FromStr for BackendCandidate {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (name, ordinal) = match s.split_once(':') {
            Some((name, ordinal)) => {
                let ordinal = ordinal.parse::<usize>().map_err(|_| {
                    PipelineError::Config(format!("Invalid device ordinal in backend '{s}'"))
                })?;
                (name, ordinal)
            }
            None => (s.as_str(), 0),
        };

        match name {
            "cpu" => Ok(BackendCandidate::Cpu),
            "cuda" | "gpu" => Ok(BackendCandidate::Cuda(ordinal)),
            "metal" => Ok(BackendCandidate::Metal(ordinal)),
            other => Err(PipelineError::Config(format!(
                "Unknown backend '{other}'. Expected one of: cpu, cuda[:N], metal[:N]"
            ))),
        }
    }
}

impl TryFrom<String> for BackendCandidate {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BackendCandidate> for String {
    fn from(value: BackendCandidate) -> Self {
        value.to_string()
    }
}

/// Picks the first backend in `candidates` that initializes.
///
/// Failures are logged and skipped. If nothing works (or the list is empty)
/// the CPU is used, so backend selection never fails.
pub fn select_device(candidates: &[BackendCandidate]) -> Device {
    for candidate in candidates {
        match candidate.open() {
            Ok(device) => {
                tracing::info!(backend = %candidate, "selected compute backend");
                return device;
            }
            Err(e) => {
                tracing::warn!(backend = %candidate, error = %e, "backend unavailable, trying next");
            }
        }
    }

    tracing::warn!("no configured backend available, falling back to cpu");
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!("cpu".parse::<BackendCandidate>().unwrap(), BackendCandidate::Cpu);
        assert_eq!(
            "cuda:1".parse::<BackendCandidate>().unwrap(),
            BackendCandidate::Cuda(1)
        );
        assert_eq!(
            " Metal ".parse::<BackendCandidate>().unwrap(),
            BackendCandidate::Metal(0)
        );
        assert!("tpu".parse::<BackendCandidate>().is_err());
        assert!("cuda:x".parse::<BackendCandidate>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for candidate in BackendCandidate::default_order() {
            let parsed: BackendCandidate = candidate.to_string().parse().unwrap();
            assert_eq!(parsed, candidate);
        }
    }

    #[test]
    fn cpu_candidate_is_selected() {
        let device = select_device(&[BackendCandidate::Cpu]);
        assert!(device.is_cpu());
    }

    #[test]
    fn empty_candidate_list_falls_back_to_cpu() {
        assert!(select_device(&[]).is_cpu());
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    #[test]
    fn unavailable_accelerators_fall_back_to_cpu() {
        let device = select_device(&[BackendCandidate::Cuda(0), BackendCandidate::Metal(0)]);
        assert!(device.is_cpu());
    }
}
