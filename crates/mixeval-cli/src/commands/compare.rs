//! The `mixeval compare` command.

use std::path::PathBuf;

use anyhow::Result;

use mixeval_core::report::{EvalReport, ScoreChange};

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: f64,
    fail_on_regression: bool,
    format: String,
) -> Result<()> {
    anyhow::ensure!(threshold >= 0.0, "threshold must not be negative");
    let baseline = EvalReport::load_json(&baseline_path)?;
    let current = EvalReport::load_json(&current_path)?;

    let report = current.compare(&baseline, threshold);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!(
                "Comparison: {} regressions, {} improvements, {} unchanged",
                report.regressions.len(),
                report.improvements.len(),
                report.unchanged
            );
            print_changes("Regressions", &report.regressions);
            print_changes("Improvements", &report.improvements);

            if report.new_datasets > 0 {
                println!("\n{} new dataset(s)", report.new_datasets);
            }
            if report.removed_datasets > 0 {
                println!("{} removed dataset(s)", report.removed_datasets);
            }
        }
    }

    if fail_on_regression && report.has_regressions() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_changes(title: &str, changes: &[ScoreChange]) {
    if changes.is_empty() {
        return;
    }
    println!("\n{title}:");
    for c in changes {
        println!(
            "  {} ({}) {:.1}% -> {:.1}% ({:+.1}%)",
            c.dataset,
            c.model,
            c.baseline_score * 100.0,
            c.current_score * 100.0,
            c.delta * 100.0
        );
    }
}
