use std::time::{Duration, Instant};

/// Timing for a single prediction, broken down by stage.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Time spent fetching and decoding the image.
    pub decode_time: Duration,
    /// Time spent preprocessing and running the model.
    pub inference_time: Duration,
    /// Total wall-clock time from request to formatted result.
    pub total_time: Duration,
}

impl PipelineStats {
    /// Create a new stats tracker (call at start of operation).
    pub(crate) fn start() -> PipelineStatsBuilder {
        let now = Instant::now();
        PipelineStatsBuilder {
            start_time: now,
            stage_start: now,
            decode_time: Duration::ZERO,
            inference_time: Duration::ZERO,
        }
    }

    /// Total time in fractional milliseconds.
    pub fn total_ms(&self) -> f64 {
        self.total_time.as_secs_f64() * 1000.0
    }
}

/// Tracks stage timings from creation until [`finish`](Self::finish).
pub(crate) struct PipelineStatsBuilder {
    start_time: Instant,
    stage_start: Instant,
    decode_time: Duration,
    inference_time: Duration,
}

impl PipelineStatsBuilder {
    pub fn decoded(&mut self) {
        let now = Instant::now();
        self.decode_time = now.duration_since(self.stage_start);
        self.stage_start = now;
    }

    pub fn inferred(&mut self) {
        let now = Instant::now();
        self.inference_time = now.duration_since(self.stage_start);
        self.stage_start = now;
    }

    pub fn finish(self) -> PipelineStats {
        PipelineStats {
            decode_time: self.decode_time,
            inference_time: self.inference_time,
            total_time: self.start_time.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineStats;
    use std::time::Duration;

    #[test]
    fn stages_fit_inside_total() {
        let mut builder = PipelineStats::start();
        std::thread::sleep(Duration::from_millis(2));
        builder.decoded();
        std::thread::sleep(Duration::from_millis(2));
        builder.inferred();
        let stats = builder.finish();

        assert!(stats.decode_time >= Duration::from_millis(2));
        assert!(stats.inference_time >= Duration::from_millis(2));
        assert!(stats.total_time >= stats.decode_time + stats.inference_time);
        assert!(stats.total_ms() >= 4.0);
    }
}
