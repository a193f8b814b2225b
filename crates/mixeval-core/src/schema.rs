//! Data-mixing schema.
//!
//! A schema is a tree: collections group datasets (or other collections),
//! and every node carries a relative weight. Flattening the tree yields the
//! leaf datasets with weights normalized so they sum to 1.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::scoring::Metric;

/// A single dataset leaf in a mixing schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// Dataset name; also the default directory name under the data dir.
    pub name: String,
    /// Weight relative to sibling nodes.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Task type used for grouping results (e.g. "math", "knowledge").
    #[serde(default = "default_task_type")]
    pub task_type: String,
    /// Free-form tags used for grouping results.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Loading and scoring arguments.
    #[serde(default)]
    pub args: DatasetArgs,
}

/// How a dataset is located, prompted, and scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetArgs {
    /// Override for the dataset location (file or directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Subsets to load. Empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsets: Vec<String>,
    /// Scoring metric.
    #[serde(default)]
    pub metric: Metric,
    /// Prompt template with `{question}`, `{choices}`, and `{id}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    /// Per-dataset system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// A named, weighted group of datasets and sub-collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub datasets: Vec<SchemaNode>,
}

/// A child of a collection.
///
/// Deserialization tries `Collection` first, so any node with a `datasets`
/// field is a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaNode {
    Collection(CollectionSchema),
    Dataset(DatasetInfo),
}

impl SchemaNode {
    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Collection(c) => &c.name,
            SchemaNode::Dataset(d) => &d.name,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            SchemaNode::Collection(c) => c.weight,
            SchemaNode::Dataset(d) => d.weight,
        }
    }
}

/// A dataset leaf after flattening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatDataset {
    pub name: String,
    /// Normalized weight; all leaves of a schema sum to 1.
    pub weight: f64,
    pub task_type: String,
    pub tags: Vec<String>,
    /// Collection names from the root down to the direct parent.
    pub hierarchy: Vec<String>,
    pub args: DatasetArgs,
}

fn default_weight() -> f64 {
    1.0
}

fn default_task_type() -> String {
    "default".to_string()
}

impl DatasetInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: default_weight(),
            task_type: default_task_type(),
            tags: Vec::new(),
            args: DatasetArgs::default(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_args(mut self, args: DatasetArgs) -> Self {
        self.args = args;
        self
    }
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: default_weight(),
            datasets: Vec::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn add_dataset(mut self, dataset: DatasetInfo) -> Self {
        self.datasets.push(SchemaNode::Dataset(dataset));
        self
    }

    pub fn add_collection(mut self, collection: CollectionSchema) -> Self {
        self.datasets.push(SchemaNode::Collection(collection));
        self
    }

    /// Flatten the tree into its dataset leaves, depth-first in declaration order.
    ///
    /// Each child's effective weight is its parent's effective weight times
    /// its share of the sibling weights. The root's own weight is ignored.
    pub fn flatten(&self) -> Result<Vec<FlatDataset>, SchemaError> {
        check_node(&self.name, self.weight)?;
        let mut out = Vec::new();
        self.flatten_into(1.0, &mut Vec::new(), &mut out)?;
        Ok(out)
    }

    fn flatten_into(
        &self,
        effective: f64,
        path: &mut Vec<String>,
        out: &mut Vec<FlatDataset>,
    ) -> Result<(), SchemaError> {
        if self.datasets.is_empty() {
            return Err(SchemaError::EmptyCollection(self.name.clone()));
        }
        for child in &self.datasets {
            check_node(child.name(), child.weight())?;
        }
        let total: f64 = self.datasets.iter().map(SchemaNode::weight).sum();
        if total <= 0.0 {
            return Err(SchemaError::ZeroTotalWeight(self.name.clone()));
        }

        path.push(self.name.clone());
        for child in &self.datasets {
            let weight = effective * child.weight() / total;
            match child {
                SchemaNode::Collection(c) => c.flatten_into(weight, path, out)?,
                SchemaNode::Dataset(d) => out.push(FlatDataset {
                    name: d.name.clone(),
                    weight,
                    task_type: d.task_type.clone(),
                    tags: d.tags.clone(),
                    hierarchy: path.clone(),
                    args: d.args.clone(),
                }),
            }
        }
        path.pop();
        Ok(())
    }

    /// Names of all dataset leaves, in flatten order.
    pub fn dataset_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.walk(&mut |d| names.push(d.name.clone()));
        names
    }

    fn walk(&self, visit: &mut dyn FnMut(&DatasetInfo)) {
        for child in &self.datasets {
            match child {
                SchemaNode::Collection(c) => c.walk(visit),
                SchemaNode::Dataset(d) => visit(d),
            }
        }
    }

    /// Parse a schema from JSON.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse schema JSON")
    }

    /// Parse a schema from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse schema TOML")
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize schema")
    }

    /// Write the schema as JSON or TOML, chosen by file extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match SchemaFormat::from_path(path)? {
            SchemaFormat::Json => self.to_json_pretty()?,
            SchemaFormat::Toml => {
                toml::to_string_pretty(self).context("failed to serialize schema as TOML")?
            }
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("failed to write schema to {}", path.display()))
    }
}

fn check_node(name: &str, weight: f64) -> Result<(), SchemaError> {
    if name.trim().is_empty() {
        return Err(SchemaError::EmptyName);
    }
    if !weight.is_finite() || weight < 0.0 {
        return Err(SchemaError::InvalidWeight {
            name: name.to_string(),
            weight,
        });
    }
    Ok(())
}

enum SchemaFormat {
    Json,
    Toml,
}

impl SchemaFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(SchemaFormat::Json),
            Some("toml") => Ok(SchemaFormat::Toml),
            _ => anyhow::bail!(
                "unsupported schema format (expected .json or .toml): {}",
                path.display()
            ),
        }
    }
}

/// Load a schema file (`.json` or `.toml`).
pub fn load_schema(path: &Path) -> Result<CollectionSchema> {
    let format = SchemaFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file: {}", path.display()))?;
    let schema = match format {
        SchemaFormat::Json => CollectionSchema::from_json_str(&content),
        SchemaFormat::Toml => CollectionSchema::from_toml_str(&content),
    }
    .with_context(|| format!("invalid schema: {}", path.display()))?;
    tracing::debug!(
        schema = %schema.name,
        datasets = schema.dataset_names().len(),
        "loaded schema"
    );
    Ok(schema)
}

/// A warning from schema validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The dataset the warning refers to, if any.
    pub dataset: Option<String>,
    pub message: String,
}

/// Check a schema for issues that don't prevent flattening.
pub fn validate_schema(schema: &CollectionSchema) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();

    schema.walk(&mut |d| {
        if !seen.insert(d.name.clone()) {
            warnings.push(ValidationWarning {
                dataset: Some(d.name.clone()),
                message: format!(
                    "dataset '{}' appears more than once; results will be merged",
                    d.name
                ),
            });
        }
        if d.weight == 0.0 {
            warnings.push(ValidationWarning {
                dataset: Some(d.name.clone()),
                message: "weight is 0; no samples will be drawn with the weighted strategy"
                    .into(),
            });
        }
        if d.tags.iter().any(|t| t.trim().is_empty()) {
            warnings.push(ValidationWarning {
                dataset: Some(d.name.clone()),
                message: "contains an empty tag".into(),
            });
        }
        if let Some(template) = &d.args.prompt_template {
            if !template.contains("{question}") {
                warnings.push(ValidationWarning {
                    dataset: Some(d.name.clone()),
                    message: "prompt_template has no {question} placeholder".into(),
                });
            }
        }
    });

    warnings
}
