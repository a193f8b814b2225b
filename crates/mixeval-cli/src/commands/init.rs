//! The `mixeval init` command.

use std::path::Path;

use anyhow::{Context, Result};

/// Files created by `init`, relative to the current directory.
const STARTER_FILES: &[(&str, &str)] = &[
    ("mixeval.toml", SAMPLE_CONFIG),
    ("collections/example.json", EXAMPLE_SCHEMA),
    ("data/example_math/default.jsonl", EXAMPLE_MATH),
    ("data/example_qa/default.jsonl", EXAMPLE_QA),
];

pub fn execute() -> Result<()> {
    for (rel, content) in STARTER_FILES {
        let path = Path::new(rel);
        if path.exists() {
            println!("{rel} already exists, skipping.");
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).with_context(|| format!("failed to write {rel}"))?;
        println!("Created {rel}");
    }

    println!("\nNext steps:");
    println!("  1. Edit mixeval.toml with your API keys");
    println!("  2. Run: mixeval validate --schema collections/example.json --data-dir data");
    println!("  3. Run: mixeval sample --schema collections/example.json --count 6 --output samples.jsonl");
    println!("  4. Run: mixeval eval --samples samples.jsonl --models mock/mock-model");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# mixeval configuration

default_provider = "openai"
default_model = "gpt-4.1-mini"
default_temperature = 0.0
max_tokens = 2048
parallelism = 4
data_dir = "./data"
output_dir = "./mixeval-results"
seed = 42

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

# Offline provider for trying the pipeline without API keys.
[providers.mock]
type = "mock"
default_response = "Answer: 4"
"#;

const EXAMPLE_SCHEMA: &str = r#"{
  "name": "example",
  "datasets": [
    {
      "name": "example_math",
      "weight": 2.0,
      "task_type": "math",
      "tags": ["en"],
      "args": { "metric": "numeric" }
    },
    {
      "name": "example_qa",
      "weight": 1.0,
      "task_type": "knowledge",
      "tags": ["en"],
      "args": { "metric": "contains" }
    }
  ]
}
"#;

const EXAMPLE_MATH: &str = r#"{"id": "m1", "question": "What is 2 + 2?", "answer": "4"}
{"id": "m2", "question": "What is 7 * 6?", "answer": "42"}
{"id": "m3", "question": "What is 100 - 58?", "answer": "42"}
{"id": "m4", "question": "What is 12 / 3?", "answer": "4"}
"#;

const EXAMPLE_QA: &str = r#"{"id": "q1", "question": "What is the capital of France?", "answer": "Paris"}
{"id": "q2", "question": "How many legs does a spider have?", "answer": "8"}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use mixeval_core::schema::CollectionSchema;

    #[test]
    fn starter_schema_flattens() {
        let schema = CollectionSchema::from_json_str(EXAMPLE_SCHEMA).unwrap();
        let flat = schema.flatten().unwrap();
        assert_eq!(flat.len(), 2);
        assert!((flat[0].weight - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn starter_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixeval.toml");
        std::fs::write(&path, SAMPLE_CONFIG).unwrap();
        let config = mixeval_providers::load_config_from(Some(&path)).unwrap();
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.seed, 42);
    }
}
