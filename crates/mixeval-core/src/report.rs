//! Eval report types with JSON persistence and regression detection.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::results::{ModelLabels, SampleResult};
use crate::statistics::AggregateStats;

/// A complete eval report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Unique report identifier (the run id).
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Summary of the mixed sample that was evaluated.
    pub collection: CollectionSummary,
    /// Models that were evaluated.
    pub models_evaluated: Vec<String>,
    /// Individual sample results, ordered by model then sample index.
    pub results: Vec<SampleResult>,
    /// Aggregate statistics.
    pub aggregate: AggregateStats,
    /// Samples that could not be evaluated (provider failures).
    #[serde(default)]
    pub failed_samples: usize,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of the mixed sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub sample_count: usize,
    /// Source datasets, in first-seen order.
    pub datasets: Vec<String>,
}

impl EvalReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: EvalReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Compare this report against a baseline, per (model, dataset) average score.
    pub fn compare(&self, baseline: &EvalReport, threshold: f64) -> RegressionReport {
        let baseline_scores = dataset_scores(baseline);
        let current_scores = dataset_scores(self);

        let mut regressions = Vec::new();
        let mut improvements = Vec::new();
        let mut unchanged = 0usize;
        let mut new_datasets = 0usize;

        for (key, &current) in &current_scores {
            let Some(&baseline_score) = baseline_scores.get(key) else {
                new_datasets += 1;
                continue;
            };
            let delta = current - baseline_score;
            let change = ScoreChange {
                model: key.0.clone(),
                dataset: key.1.clone(),
                baseline_score,
                current_score: current,
                delta,
            };
            if delta < -threshold {
                regressions.push(change);
            } else if delta > threshold {
                improvements.push(change);
            } else {
                unchanged += 1;
            }
        }

        let removed_datasets = baseline_scores
            .keys()
            .filter(|k| !current_scores.contains_key(k))
            .count();

        regressions.sort_by(|a, b| a.delta.total_cmp(&b.delta));
        improvements.sort_by(|a, b| b.delta.total_cmp(&a.delta));

        RegressionReport {
            regressions,
            improvements,
            unchanged,
            new_datasets,
            removed_datasets,
        }
    }
}

fn dataset_scores(report: &EvalReport) -> HashMap<(String, String), f64> {
    let labels = ModelLabels::from_results(&report.results);
    let mut sums: HashMap<(String, String), (f64, usize)> = HashMap::new();
    for r in &report.results {
        let entry = sums
            .entry((labels.label(&r.provider, &r.model), r.dataset.clone()))
            .or_insert((0.0, 0));
        entry.0 += r.score;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect()
}

/// Result of comparing two reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionReport {
    /// Datasets whose score went down, worst first.
    pub regressions: Vec<ScoreChange>,
    /// Datasets whose score went up, best first.
    pub improvements: Vec<ScoreChange>,
    /// Datasets with no significant change.
    pub unchanged: usize,
    /// (model, dataset) pairs in current but not baseline.
    pub new_datasets: usize,
    /// (model, dataset) pairs in baseline but not current.
    pub removed_datasets: usize,
}

/// A significant score change for one model on one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreChange {
    pub model: String,
    pub dataset: String,
    pub baseline_score: f64,
    pub current_score: f64,
    pub delta: f64,
}

impl RegressionReport {
    /// Format the regression report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} regressions, {} improvements, {} unchanged\n\n",
            self.regressions.len(),
            self.improvements.len(),
            self.unchanged
        ));

        for (title, changes) in [
            ("Regressions", &self.regressions),
            ("Improvements", &self.improvements),
        ] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Dataset | Model | Baseline | Current | Delta |\n");
            md.push_str("|---------|-------|----------|---------|-------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {} | {:.1}% | {:.1}% | {:+.1}% |\n",
                    c.dataset,
                    c.model,
                    c.baseline_score * 100.0,
                    c.current_score * 100.0,
                    c.delta * 100.0
                ));
            }
            md.push('\n');
        }

        md
    }

    /// Returns true if there are any regressions.
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::TokenUsage;
    use crate::scoring::Metric;
    use crate::statistics::compute_aggregate_stats;

    fn make_result(dataset: &str, model: &str, score: f64) -> SampleResult {
        SampleResult {
            index: 0,
            dataset: dataset.into(),
            subset: "default".into(),
            task_type: "default".into(),
            tags: vec![],
            hierarchy: vec![],
            weight: 1.0,
            record_id: "r".into(),
            model: model.into(),
            provider: "test".into(),
            metric: Metric::ExactMatch,
            response: String::new(),
            prediction: String::new(),
            gold: String::new(),
            score,
            latency_ms: 0,
            token_usage: TokenUsage::default(),
            run_id: Uuid::nil(),
        }
    }

    fn make_report(results: Vec<SampleResult>) -> EvalReport {
        let aggregate = compute_aggregate_stats(&results);
        EvalReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            collection: CollectionSummary {
                name: "test".into(),
                sample_count: results.len(),
                datasets: vec![],
            },
            models_evaluated: vec!["model1".into()],
            results,
            aggregate,
            failed_samples: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn compare_identical_reports() {
        let baseline = make_report(vec![make_result("arc", "model1", 1.0)]);
        let current = make_report(vec![make_result("arc", "model1", 1.0)]);

        let report = current.compare(&baseline, 0.05);
        assert!(report.regressions.is_empty());
        assert!(report.improvements.is_empty());
        assert_eq!(report.unchanged, 1);
    }

    #[test]
    fn compare_averages_per_dataset() {
        let baseline = make_report(vec![
            make_result("arc", "model1", 1.0),
            make_result("arc", "model1", 1.0),
            make_result("gsm8k", "model1", 0.0),
        ]);
        let current = make_report(vec![
            make_result("arc", "model1", 1.0),
            make_result("arc", "model1", 0.0),
            make_result("gsm8k", "model1", 1.0),
        ]);

        let report = current.compare(&baseline, 0.05);
        assert_eq!(report.regressions.len(), 1);
        assert_eq!(report.regressions[0].dataset, "arc");
        assert!((report.regressions[0].delta + 0.5).abs() < 1e-12);
        assert_eq!(report.improvements.len(), 1);
        assert_eq!(report.improvements[0].dataset, "gsm8k");
        assert!(report.has_regressions());
    }

    #[test]
    fn compare_keeps_providers_of_one_model_apart() {
        let from = |provider: &str, score: f64| {
            let mut r = make_result("arc", "llama3", score);
            r.provider = provider.into();
            r
        };
        let baseline = make_report(vec![from("ollama", 1.0), from("openai", 1.0)]);
        let current = make_report(vec![from("ollama", 1.0), from("openai", 0.0)]);

        let report = current.compare(&baseline, 0.05);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.regressions.len(), 1);
        assert_eq!(report.regressions[0].model, "openai/llama3");
    }

    #[test]
    fn compare_with_new_and_removed() {
        let baseline = make_report(vec![make_result("old", "model1", 1.0)]);
        let current = make_report(vec![make_result("new", "model1", 1.0)]);

        let report = current.compare(&baseline, 0.05);
        assert_eq!(report.new_datasets, 1);
        assert_eq!(report.removed_datasets, 1);
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report(vec![make_result("arc", "model1", 1.0)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/report.json");

        report.save_json(&path).unwrap();
        let loaded = EvalReport::load_json(&path).unwrap();

        assert_eq!(loaded.collection.name, "test");
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.aggregate.per_model["model1"].sample_count, 1);
    }

    #[test]
    fn markdown_output() {
        let baseline = make_report(vec![make_result("arc", "model1", 1.0)]);
        let current = make_report(vec![make_result("arc", "model1", 0.0)]);

        let md = current.compare(&baseline, 0.05).to_markdown();
        assert!(md.contains("Regressions"));
        assert!(md.contains("| arc | model1 | 100.0% | 0.0% | -100.0% |"));
    }
}
