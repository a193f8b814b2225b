//! Aggregate statistics over a mixed evaluation.
//!
//! Scores are rolled up at several levels: subset, dataset, task type, tag,
//! and schema category (every prefix of a dataset's collection hierarchy).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::results::{ModelLabels, SampleResult};

/// Aggregate statistics across all results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Per-model statistics.
    pub per_model: HashMap<String, ModelStats>,
}

/// Scores for one group of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub name: String,
    pub count: usize,
    /// Plain mean of sample scores.
    pub average_score: f64,
    /// Mean weighted by each sample's schema weight.
    pub weighted_score: f64,
}

/// Statistics for a single model across the mixed sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    pub model: String,
    pub sample_count: usize,
    /// Micro average over all samples.
    pub average_score: f64,
    /// Average weighted by schema weight.
    pub weighted_score: f64,
    /// Mean of per-dataset averages.
    pub macro_dataset_score: f64,
    /// Keyed `dataset/subset`.
    pub per_subset: Vec<GroupStats>,
    pub per_dataset: Vec<GroupStats>,
    pub per_task_type: Vec<GroupStats>,
    pub per_tag: Vec<GroupStats>,
    /// Keyed by hierarchy prefix, e.g. `index/math`.
    pub per_category: Vec<GroupStats>,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub avg_latency_ms: u64,
}

impl ModelStats {
    /// Look up a dataset's group by name.
    pub fn dataset(&self, name: &str) -> Option<&GroupStats> {
        self.per_dataset.iter().find(|g| g.name == name)
    }
}

/// Score a group of results.
pub fn group_stats(name: &str, results: &[&SampleResult]) -> GroupStats {
    let count = results.len();
    let average_score = if count == 0 {
        0.0
    } else {
        results.iter().map(|r| r.score).sum::<f64>() / count as f64
    };
    let total_weight: f64 = results.iter().map(|r| r.weight).sum();
    let weighted_score = if total_weight > 0.0 {
        results.iter().map(|r| r.weight * r.score).sum::<f64>() / total_weight
    } else {
        average_score
    };
    GroupStats {
        name: name.to_string(),
        count,
        average_score,
        weighted_score,
    }
}

/// Group results under zero or more keys each and score every group, sorted by name.
fn grouped<'a, F>(results: &[&'a SampleResult], keys: F) -> Vec<GroupStats>
where
    F: Fn(&SampleResult) -> Vec<String>,
{
    let mut groups: BTreeMap<String, Vec<&'a SampleResult>> = BTreeMap::new();
    for &r in results {
        for key in keys(r) {
            groups.entry(key).or_default().push(r);
        }
    }
    groups
        .iter()
        .map(|(name, members)| group_stats(name, members))
        .collect()
}

fn category_keys(hierarchy: &[String]) -> Vec<String> {
    (1..=hierarchy.len())
        .map(|depth| hierarchy[..depth].join("/"))
        .collect()
}

/// Compute aggregate statistics from all results.
///
/// Models are keyed by their [`ModelLabels`] name, so one model id served by
/// two providers is reported twice.
pub fn compute_aggregate_stats(results: &[SampleResult]) -> AggregateStats {
    let labels = ModelLabels::from_results(results);
    let mut model_results: HashMap<String, Vec<&SampleResult>> = HashMap::new();
    for r in results {
        model_results
            .entry(labels.label(&r.provider, &r.model))
            .or_default()
            .push(r);
    }

    let per_model = model_results
        .into_iter()
        .map(|(model, res)| {
            let overall = group_stats(&model, &res);
            let per_dataset = grouped(&res, |r| vec![r.dataset.clone()]);
            let macro_dataset_score = if per_dataset.is_empty() {
                0.0
            } else {
                per_dataset.iter().map(|g| g.average_score).sum::<f64>()
                    / per_dataset.len() as f64
            };

            let stats = ModelStats {
                model: model.clone(),
                sample_count: overall.count,
                average_score: overall.average_score,
                weighted_score: overall.weighted_score,
                macro_dataset_score,
                per_subset: grouped(&res, |r| vec![format!("{}/{}", r.dataset, r.subset)]),
                per_dataset,
                per_task_type: grouped(&res, |r| vec![r.task_type.clone()]),
                per_tag: grouped(&res, |r| r.tags.clone()),
                per_category: grouped(&res, |r| category_keys(&r.hierarchy)),
                total_tokens: res.iter().map(|r| r.token_usage.total_tokens as u64).sum(),
                total_cost_usd: res.iter().map(|r| r.token_usage.estimated_cost_usd).sum(),
                avg_latency_ms: res.iter().map(|r| r.latency_ms).sum::<u64>()
                    / res.len().max(1) as u64,
            };
            (model, stats)
        })
        .collect();

    AggregateStats { per_model }
}
