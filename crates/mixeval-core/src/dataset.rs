//! Source dataset loading.
//!
//! Datasets are directories of JSONL files, one file per subset:
//! `<data_dir>/<dataset>/<subset>.jsonl`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::schema::FlatDataset;

/// One evaluation item from a source dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "prompt", alias = "input", alias = "query")]
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    /// Numeric and boolean answers are kept in their JSON text form.
    #[serde(alias = "target", alias = "label", deserialize_with = "scalar_string")]
    pub answer: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "answer must be a string, number, or boolean, got {other}"
        ))),
    }
}

/// A named subset of a dataset.
#[derive(Debug, Clone)]
pub struct Subset {
    pub name: String,
    pub records: Vec<DatasetRecord>,
}

/// A dataset with all of its selected subsets in memory.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub name: String,
    /// Subsets, sorted by name.
    pub subsets: Vec<Subset>,
}

impl LoadedDataset {
    /// Total records across subsets.
    pub fn len(&self) -> usize {
        self.subsets.iter().map(|s| s.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(subset name, record)` pairs in subset order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatasetRecord)> {
        self.subsets
            .iter()
            .flat_map(|s| s.records.iter().map(move |r| (s.name.as_str(), r)))
    }
}

/// Resolve where a dataset lives on disk.
pub fn dataset_location(data_dir: &Path, dataset: &FlatDataset) -> PathBuf {
    match &dataset.args.path {
        Some(p) if p.is_absolute() => p.clone(),
        Some(p) => data_dir.join(p),
        None => data_dir.join(&dataset.name),
    }
}

/// Load a dataset's subsets from `data_dir`.
pub fn load_dataset(data_dir: &Path, dataset: &FlatDataset) -> Result<LoadedDataset> {
    let location = dataset_location(data_dir, dataset);

    let mut files: Vec<(String, PathBuf)> = if location.is_dir() {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&location)
            .with_context(|| format!("failed to read dataset directory: {}", location.display()))?
        {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl") {
                files.push((subset_name(&path), path));
            }
        }
        files
    } else if location.is_file() {
        vec![(subset_name(&location), location.clone())]
    } else {
        anyhow::bail!(
            "dataset '{}' not found at {}",
            dataset.name,
            location.display()
        );
    };
    files.sort_by(|a, b| a.0.cmp(&b.0));

    if !dataset.args.subsets.is_empty() {
        for wanted in &dataset.args.subsets {
            if !files.iter().any(|(name, _)| name == wanted) {
                anyhow::bail!(
                    "dataset '{}' has no subset '{}' in {}",
                    dataset.name,
                    wanted,
                    location.display()
                );
            }
        }
        files.retain(|(name, _)| dataset.args.subsets.contains(name));
    }

    let subsets = files
        .into_iter()
        .map(|(name, path)| {
            let records = read_jsonl_records(&path, &name)?;
            Ok(Subset { name, records })
        })
        .collect::<Result<Vec<_>>>()?;

    let loaded = LoadedDataset {
        name: dataset.name.clone(),
        subsets,
    };
    tracing::debug!(
        dataset = %loaded.name,
        subsets = loaded.subsets.len(),
        records = loaded.len(),
        "loaded dataset"
    );
    Ok(loaded)
}

fn subset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "default".to_string())
}

/// Read records from a JSONL file, filling in missing ids as `<subset>-<line>`.
pub fn read_jsonl_records(path: &Path, subset: &str) -> Result<Vec<DatasetRecord>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open dataset file: {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let mut record: DatasetRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}: line {}", path.display(), line_num + 1))?;
        if record.id.is_empty() {
            record.id = format!("{subset}-{}", line_num + 1);
        }
        records.push(record);
    }

    Ok(records)
}
