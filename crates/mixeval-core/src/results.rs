//! Per-sample evaluation results.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sampler::MixedSample;
use crate::scoring::Metric;

/// Token counts and cost for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// The outcome of evaluating one mixed sample against one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// Index of the sample in the mixed sample file.
    pub index: usize,
    pub dataset: String,
    pub subset: String,
    pub task_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub hierarchy: Vec<String>,
    /// Normalized schema weight of the source dataset.
    pub weight: f64,
    pub record_id: String,
    pub model: String,
    pub provider: String,
    pub metric: Metric,
    /// Raw model response.
    pub response: String,
    /// Answer extracted from the response.
    pub prediction: String,
    /// Gold answer.
    pub gold: String,
    /// Score in `[0, 1]`.
    pub score: f64,
    pub latency_ms: u64,
    pub token_usage: TokenUsage,
    pub run_id: Uuid,
}

impl SampleResult {
    /// Build a result carrying the sample's grouping metadata.
    pub fn for_sample(sample: &MixedSample, model: &str, provider: &str, run_id: Uuid) -> Self {
        Self {
            index: sample.index,
            dataset: sample.dataset.clone(),
            subset: sample.subset.clone(),
            task_type: sample.task_type.clone(),
            tags: sample.tags.clone(),
            hierarchy: sample.hierarchy.clone(),
            weight: sample.weight,
            record_id: sample.record.id.clone(),
            model: model.to_string(),
            provider: provider.to_string(),
            metric: sample.metric,
            response: String::new(),
            prediction: String::new(),
            gold: sample.record.answer.clone(),
            score: 0.0,
            latency_ms: 0,
            token_usage: TokenUsage::default(),
            run_id,
        }
    }

    /// Whether the sample was scored as fully correct.
    pub fn is_correct(&self) -> bool {
        self.score >= 1.0
    }
}

/// Display names for evaluated models.
///
/// A model is named by its id alone unless the same id was run through more
/// than one provider, in which case it becomes `provider/model`.
#[derive(Debug, Default)]
pub struct ModelLabels {
    shared: HashSet<String>,
}

impl ModelLabels {
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        let mut shared = HashSet::new();
        for (provider, model) in pairs {
            if let Some(previous) = seen.insert(model, provider) {
                if previous != provider {
                    shared.insert(model.to_string());
                }
            }
        }
        Self { shared }
    }

    /// Labels for every (provider, model) pair in `results`.
    pub fn from_results(results: &[SampleResult]) -> Self {
        Self::new(results.iter().map(|r| (r.provider.as_str(), r.model.as_str())))
    }

    pub fn label(&self, provider: &str, model: &str) -> String {
        if self.shared.contains(model) {
            format!("{provider}/{model}")
        } else {
            model.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_qualify_only_shared_model_ids() {
        let labels = ModelLabels::new([
            ("ollama", "llama3"),
            ("openai", "llama3"),
            ("openai", "gpt-4.1"),
            ("openai", "gpt-4.1"),
        ]);
        assert_eq!(labels.label("ollama", "llama3"), "ollama/llama3");
        assert_eq!(labels.label("openai", "llama3"), "openai/llama3");
        assert_eq!(labels.label("openai", "gpt-4.1"), "gpt-4.1");
    }
}
