//! The `mixeval sample` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use mixeval_core::dataset::load_dataset;
use mixeval_core::sampler::{sample, write_samples, SamplerConfig, SamplingStrategy};
use mixeval_core::schema::load_schema;
use mixeval_providers::config::load_config_from;

pub struct SampleArgs {
    pub schema: PathBuf,
    pub count: usize,
    pub strategy: String,
    pub seed: Option<u64>,
    pub shuffle: bool,
    pub data_dir: Option<PathBuf>,
    pub output: PathBuf,
    pub config: Option<PathBuf>,
}

pub fn execute(args: SampleArgs) -> Result<()> {
    anyhow::ensure!(args.count >= 1, "count must be at least 1");
    let strategy: SamplingStrategy = args.strategy.parse().map_err(anyhow::Error::msg)?;

    let config = load_config_from(args.config.as_deref())?;
    let data_dir = args.data_dir.unwrap_or(config.data_dir);
    let seed = args.seed.unwrap_or(config.seed);

    let schema = load_schema(&args.schema)?;
    let flat = schema.flatten()?;
    let datasets = flat
        .into_iter()
        .map(|d| {
            let loaded = load_dataset(&data_dir, &d)?;
            Ok((d, loaded))
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("failed to load datasets from {}", data_dir.display()))?;

    let sampler_config = SamplerConfig {
        strategy,
        count: args.count,
        seed,
        shuffle: args.shuffle,
    };
    let (samples, summary) = sample(&datasets, &sampler_config)?;
    write_samples(&args.output, &samples)?;

    let mut table = Table::new();
    table.set_header(vec!["Dataset", "Weight", "Samples", "Available", ""]);
    for ((info, _), alloc) in datasets.iter().zip(&summary.per_dataset) {
        table.add_row(vec![
            Cell::new(&alloc.dataset),
            Cell::new(format!("{:.1}%", info.weight * 100.0)),
            Cell::new(alloc.requested),
            Cell::new(alloc.available),
            Cell::new(if alloc.oversampled() {
                "with replacement"
            } else {
                ""
            }),
        ]);
    }

    println!(
        "Sampled {} records from '{}' ({} strategy, seed {})",
        samples.len(),
        schema.name,
        strategy,
        seed
    );
    println!("{table}");
    println!("Samples written to: {}", args.output.display());

    Ok(())
}
