//! Drawing a mixed sample from several datasets.
//!
//! Every strategy works the same way: compute one weight per dataset, turn the
//! weights into integer quotas that sum exactly to the requested count, then
//! draw each quota from its dataset with a seeded RNG.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetRecord, LoadedDataset};
use crate::error::SamplingError;
use crate::schema::FlatDataset;
use crate::scoring::Metric;

/// How per-dataset quotas are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    /// Quotas follow the schema's normalized weights.
    #[default]
    Weighted,
    /// Quotas follow each dataset's record count.
    Stratified,
    /// Every dataset gets the same quota.
    Uniform,
}

impl SamplingStrategy {
    fn weights(&self, datasets: &[(FlatDataset, LoadedDataset)]) -> Vec<f64> {
        match self {
            SamplingStrategy::Weighted => datasets.iter().map(|(info, _)| info.weight).collect(),
            SamplingStrategy::Stratified => {
                datasets.iter().map(|(_, data)| data.len() as f64).collect()
            }
            SamplingStrategy::Uniform => vec![1.0; datasets.len()],
        }
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingStrategy::Weighted => write!(f, "weighted"),
            SamplingStrategy::Stratified => write!(f, "stratified"),
            SamplingStrategy::Uniform => write!(f, "uniform"),
        }
    }
}

impl FromStr for SamplingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weighted" | "weight" => Ok(SamplingStrategy::Weighted),
            "stratified" => Ok(SamplingStrategy::Stratified),
            "uniform" => Ok(SamplingStrategy::Uniform),
            other => Err(format!("unknown sampling strategy: {other}")),
        }
    }
}

/// Sampling parameters.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub strategy: SamplingStrategy,
    /// Total number of samples to draw.
    pub count: usize,
    pub seed: u64,
    /// Shuffle the combined sample so datasets are interleaved.
    pub shuffle: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::Weighted,
            count: 100,
            seed: 42,
            shuffle: true,
        }
    }
}

/// One record of a mixed sample, carrying everything needed to evaluate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedSample {
    /// Position in the mixed sample, `0..n`.
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
    #[serde(default)]
    pub metric: Metric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub record: DatasetRecord,
}

/// Requested vs. available records for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetAllocation {
    pub dataset: String,
    pub requested: usize,
    pub available: usize,
}

impl DatasetAllocation {
    /// Whether records had to be drawn more than once.
    pub fn oversampled(&self) -> bool {
        self.requested > self.available
    }
}

/// What a sampling run drew from each dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingSummary {
    pub strategy: SamplingStrategy,
    pub per_dataset: Vec<DatasetAllocation>,
}

/// Split `count` into integer quotas proportional to `weights`.
///
/// Uses largest-remainder apportionment: quotas always sum to `count`, and
/// remainder ties go to the earlier dataset.
pub fn allocate(weights: &[f64], count: usize) -> Result<Vec<usize>, SamplingError> {
    if weights.is_empty() {
        return Err(SamplingError::NoDatasets);
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(SamplingError::ZeroWeight);
    }

    let exact: Vec<f64> = weights.iter().map(|w| w / total * count as f64).collect();
    let mut quotas: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let assigned: usize = quotas.iter().sum();

    let mut by_remainder: Vec<usize> = (0..weights.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for &i in by_remainder.iter().take(count.saturating_sub(assigned)) {
        quotas[i] += 1;
    }

    Ok(quotas)
}

/// Draw a mixed sample from loaded datasets.
///
/// A quota larger than its dataset takes every record once and fills the
/// rest with replacement. The output is deterministic for a given seed.
pub fn sample(
    datasets: &[(FlatDataset, LoadedDataset)],
    config: &SamplerConfig,
) -> Result<(Vec<MixedSample>, SamplingSummary), SamplingError> {
    let quotas = allocate(&config.strategy.weights(datasets), config.count)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut samples = Vec::with_capacity(config.count);
    let mut summary = SamplingSummary {
        strategy: config.strategy,
        per_dataset: Vec::with_capacity(datasets.len()),
    };

    for ((info, data), &quota) in datasets.iter().zip(&quotas) {
        let pool: Vec<(&str, &DatasetRecord)> = data.iter().collect();
        summary.per_dataset.push(DatasetAllocation {
            dataset: info.name.clone(),
            requested: quota,
            available: pool.len(),
        });
        if quota == 0 {
            continue;
        }
        if pool.is_empty() {
            return Err(SamplingError::EmptyDataset(info.name.clone()));
        }

        let picks: Vec<usize> = if quota <= pool.len() {
            rand::seq::index::sample(&mut rng, pool.len(), quota).into_vec()
        } else {
            tracing::warn!(
                dataset = %info.name,
                requested = quota,
                available = pool.len(),
                "quota exceeds dataset size, sampling with replacement"
            );
            let mut picks: Vec<usize> = (0..pool.len()).collect();
            picks.shuffle(&mut rng);
            picks.extend((pool.len()..quota).map(|_| rng.gen_range(0..pool.len())));
            picks
        };

        samples.extend(picks.into_iter().map(|i| {
            let (subset, record) = pool[i];
            MixedSample {
                index: 0,
                dataset: info.name.clone(),
                subset: subset.to_string(),
                task_type: info.task_type.clone(),
                tags: info.tags.clone(),
                hierarchy: info.hierarchy.clone(),
                weight: info.weight,
                metric: info.args.metric,
                prompt_template: info.args.prompt_template.clone(),
                system_prompt: info.args.system_prompt.clone(),
                record: record.clone(),
            }
        }));
    }

    if config.shuffle {
        samples.shuffle(&mut rng);
    }
    for (i, s) in samples.iter_mut().enumerate() {
        s.index = i;
    }

    tracing::info!(
        strategy = %config.strategy,
        samples = samples.len(),
        datasets = datasets.len(),
        "sampled mixed dataset"
    );
    Ok((samples, summary))
}

/// Write samples as JSONL.
pub fn write_samples(path: &Path, samples: &[MixedSample]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)
        .with_context(|| format!("failed to create sample file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for sample in samples {
        serde_json::to_writer(&mut writer, sample).context("failed to serialize sample")?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read samples from a JSONL file.
pub fn read_samples(path: &Path) -> Result<Vec<MixedSample>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open sample file: {}", path.display()))?;
    let mut samples = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: MixedSample = serde_json::from_str(&line)
            .with_context(|| format!("{}: line {}", path.display(), line_num + 1))?;
        samples.push(sample);
    }
    Ok(samples)
}
