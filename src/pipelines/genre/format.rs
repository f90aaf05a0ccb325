use super::labels::LabelSet;
use serde::Serialize;

/// A label with its confidence score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Label name.
    pub label: String,
    /// Confidence score (0.0 to 1.0).
    pub confidence: f32,
}

/// Output of a single prediction call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    /// One entry per label, highest confidence first.
    pub predictions: Vec<Prediction>,
    /// Wall-clock time of the whole call.
    pub processing_time_ms: f64,
}

impl PredictionResult {
    /// Highest-confidence prediction.
    pub fn top(&self) -> Option<&Prediction> {
        self.predictions.first()
    }
}

/// Pair raw model outputs with labels, clamp them into `[0, 1]` and rank them.
///
/// Every label gets exactly one entry. Missing or NaN outputs score 0. The
/// sort is stable, so equal scores keep label order.
pub fn format_predictions(labels: &LabelSet, raw: &[f32]) -> Vec<Prediction> {
    let mut predictions: Vec<Prediction> = labels
        .iter()
        .enumerate()
        .map(|(index, label)| Prediction {
            label: label.to_string(),
            confidence: clamp_confidence(raw.get(index).copied()),
        })
        .collect();

    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    predictions
}

fn clamp_confidence(value: Option<f32>) -> f32 {
    match value {
        // -0.0 maps to +0.0 so it ties with zero under total_cmp
        Some(v) if v.is_nan() || v <= 0.0 => 0.0,
        Some(v) if v >= 1.0 => 1.0,
        Some(v) => v,
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> LabelSet {
        LabelSet::new(names.iter().copied()).unwrap()
    }

    #[test]
    fn ranks_by_confidence() {
        let out = format_predictions(&labels(&["Cat", "Dog"]), &[0.2, 0.8]);
        assert_eq!(
            out,
            vec![
                Prediction {
                    label: "Dog".into(),
                    confidence: 0.8
                },
                Prediction {
                    label: "Cat".into(),
                    confidence: 0.2
                },
            ]
        );
    }

    #[test]
    fn clamps_out_of_range_values() {
        let out = format_predictions(&labels(&["High", "Low", "Mid"]), &[1.7, -0.3, 0.5]);
        let score = |name: &str| out.iter().find(|p| p.label == name).unwrap().confidence;
        assert_eq!(score("High"), 1.0);
        assert_eq!(score("Low"), 0.0);
        assert_eq!(score("Mid"), 0.5);
    }

    #[test]
    fn ties_keep_label_order() {
        let out = format_predictions(&labels(&["A", "B", "C", "D"]), &[0.5, 0.9, 0.5, 0.5]);
        let order: Vec<&str> = out.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(order, ["B", "A", "C", "D"]);
    }

    #[test]
    fn negative_zero_ties_with_zero() {
        let out = format_predictions(&labels(&["A", "B"]), &[0.0, -0.0]);
        let order: Vec<&str> = out.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(order, ["A", "B"]);
        assert!(out.iter().all(|p| p.confidence.is_sign_positive()));
    }

    #[test]
    fn missing_and_nan_outputs_score_zero() {
        let out = format_predictions(&labels(&["A", "B", "C"]), &[f32::NAN, 0.3]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].label, "B");
        assert_eq!(out[1].confidence, 0.0);
        assert_eq!(out[2].confidence, 0.0);
    }

    #[test]
    fn always_one_entry_per_label_sorted_and_bounded() {
        let names = LabelSet::anime_genres();
        let raw = [3.0, -1.0, 0.1, 0.99, f32::INFINITY, f32::NEG_INFINITY, 0.4, 0.4, 1e-9];
        let out = format_predictions(&names, &raw);

        assert_eq!(out.len(), names.len());
        assert!(out.iter().all(|p| (0.0..=1.0).contains(&p.confidence)));
        assert!(out.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn result_serializes_in_camel_case() {
        let result = PredictionResult {
            predictions: format_predictions(&labels(&["Cat"]), &[0.5]),
            processing_time_ms: 12.5,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["processingTimeMs"], 12.5);
        assert_eq!(json["predictions"][0]["label"], "Cat");
        assert_eq!(result.top().unwrap().label, "Cat");
    }
}
