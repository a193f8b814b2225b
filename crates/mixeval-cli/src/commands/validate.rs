//! The `mixeval validate` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::Table;

use mixeval_core::dataset::load_dataset;
use mixeval_core::schema::{load_schema, validate_schema};

pub fn execute(schema_path: PathBuf, data_dir: Option<PathBuf>) -> Result<()> {
    let schema = load_schema(&schema_path)?;
    let flat = schema.flatten()?;

    println!("Schema: {} ({} datasets)", schema.name, flat.len());

    let mut table = Table::new();
    let mut header = vec!["Dataset", "Path", "Weight", "Task type", "Metric", "Tags"];
    if data_dir.is_some() {
        header.push("Records");
    }
    table.set_header(header);

    let mut load_errors = 0usize;
    for d in &flat {
        let mut row = vec![
            d.name.clone(),
            d.hierarchy.join("/"),
            format!("{:.1}%", d.weight * 100.0),
            d.task_type.clone(),
            d.args.metric.to_string(),
            d.tags.join(", "),
        ];
        if let Some(dir) = &data_dir {
            row.push(match load_dataset(dir, d) {
                Ok(loaded) => {
                    let subsets: Vec<String> = loaded
                        .subsets
                        .iter()
                        .map(|s| format!("{}={}", s.name, s.records.len()))
                        .collect();
                    format!("{} ({})", loaded.len(), subsets.join(", "))
                }
                Err(e) => {
                    load_errors += 1;
                    format!("ERROR: {e:#}")
                }
            });
        }
        table.add_row(row);
    }
    println!("{table}");

    let warnings = validate_schema(&schema);
    for w in &warnings {
        let prefix = w
            .dataset
            .as_ref()
            .map(|name| format!("  [{name}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    anyhow::ensure!(
        load_errors == 0,
        "{load_errors} dataset(s) could not be loaded"
    );

    if warnings.is_empty() {
        println!("Schema valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
