//! The `mixeval eval` command.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table};

use mixeval_core::cache::ResultCache;
use mixeval_core::engine::{EvalEngine, EvalEngineConfig, ModelSpec, ProgressReporter};
use mixeval_core::report::EvalReport;
use mixeval_core::results::SampleResult;
use mixeval_core::sampler::read_samples;
use mixeval_core::traits::LlmProvider;
use mixeval_providers::config::load_config_from;
use mixeval_providers::create_provider;
use mixeval_report::html::write_html_report;

/// Console progress reporter.
struct ConsoleReporter {
    total: usize,
    done: AtomicUsize,
}

impl ProgressReporter for ConsoleReporter {
    fn on_sample_start(&self, index: usize, model: &str) {
        tracing::debug!("starting sample {index} for {model}");
    }

    fn on_sample_complete(&self, result: &SampleResult) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let mark = if result.is_correct() { "OK" } else { "MISS" };
        eprintln!(
            "  [{done}/{}] {} :: #{} {}/{} {mark} ({}ms)",
            self.total, result.model, result.index, result.dataset, result.subset, result.latency_ms,
        );
    }

    fn on_sample_error(&self, index: usize, model: &str, error: &str) {
        self.done.fetch_add(1, Ordering::Relaxed);
        eprintln!("  ERROR: {model} :: #{index}: {error}");
    }

    fn on_run_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} scored, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub struct EvalArgs {
    pub samples: PathBuf,
    pub models: Option<String>,
    pub parallelism: Option<usize>,
    pub temperature: Option<f64>,
    pub limit: Option<usize>,
    pub use_cache: bool,
    pub name: Option<String>,
    pub output: Option<PathBuf>,
    pub format: String,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: EvalArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;

    let parallelism = args.parallelism.unwrap_or(config.parallelism);
    let temperature = args.temperature.unwrap_or(config.default_temperature);
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
    anyhow::ensure!(
        (0.0..=2.0).contains(&temperature),
        "temperature must be between 0.0 and 2.0"
    );

    let formats = parse_formats(&args.format)?;
    let output = args.output.unwrap_or_else(|| config.output_dir.clone());

    let mut samples = read_samples(&args.samples)?;
    if let Some(limit) = args.limit {
        samples.truncate(limit);
    }
    anyhow::ensure!(
        !samples.is_empty(),
        "no samples in {}",
        args.samples.display()
    );

    let collection_name = args
        .name
        .or_else(|| samples[0].hierarchy.first().cloned())
        .unwrap_or_else(|| file_stem(&args.samples));

    let models: Vec<ModelSpec> = match &args.models {
        Some(m) => m
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| ModelSpec::parse(s, &config.default_provider))
            .collect(),
        None => vec![ModelSpec {
            provider: config.default_provider.clone(),
            model: config.default_model.clone(),
        }],
    };
    anyhow::ensure!(!models.is_empty(), "no models given");

    let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
    for model_spec in &models {
        if providers.contains_key(&model_spec.provider) {
            continue;
        }
        let Some(pconfig) = config.providers.get(&model_spec.provider) else {
            let mut available: Vec<&String> = config.providers.keys().collect();
            available.sort();
            anyhow::bail!(
                "provider '{}' not found in config. Available: {:?}",
                model_spec.provider,
                available
            );
        };
        providers.insert(
            model_spec.provider.clone(),
            Arc::from(create_provider(pconfig)?),
        );
    }

    let engine_config = EvalEngineConfig {
        parallelism,
        temperature,
        max_tokens: config.max_tokens,
        max_retries_per_sample: config.max_retries,
        retry_delay: Duration::from_millis(config.retry_delay_ms),
        system_prompt_override: None,
    };
    let mut engine = EvalEngine::new(providers, engine_config);
    if args.use_cache {
        engine = engine.with_cache(ResultCache::new(output.join("cache"))?);
    }

    eprintln!(
        "mixeval v{}: evaluating {} samples x {} models on '{}'",
        env!("CARGO_PKG_VERSION"),
        samples.len(),
        models.len(),
        collection_name
    );
    eprintln!();

    let reporter = ConsoleReporter {
        total: samples.len() * models.len(),
        done: AtomicUsize::new(0),
    };
    let report = engine
        .run(&collection_name, &samples, &models, &reporter)
        .await?;

    print_summary(&report);

    std::fs::create_dir_all(&output)?;
    let timestamp = report.created_at.format("%Y-%m-%dT%H%M%S");
    for fmt in &formats {
        match fmt {
            ReportFormat::Json => {
                let path = output.join(format!("report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            ReportFormat::Html => {
                let path = output.join(format!("report-{timestamp}.html"));
                write_html_report(&report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ReportFormat {
    Json,
    Html,
}

fn parse_formats(format: &str) -> Result<Vec<ReportFormat>> {
    if format == "all" {
        return Ok(vec![ReportFormat::Json, ReportFormat::Html]);
    }
    let mut formats = Vec::new();
    for f in format.split(',').map(str::trim) {
        let f = match f {
            "json" => ReportFormat::Json,
            "html" => ReportFormat::Html,
            other => anyhow::bail!("unknown format '{other}' (expected json, html, or all)"),
        };
        if !formats.contains(&f) {
            formats.push(f);
        }
    }
    Ok(formats)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "samples".to_string())
}

fn print_summary(report: &EvalReport) {
    let mut models: Vec<_> = report.aggregate.per_model.values().collect();
    models.sort_by(|a, b| a.model.cmp(&b.model));

    let mut table = Table::new();
    table.set_header(vec![
        "Model", "Samples", "Average", "Weighted", "Macro", "Tokens", "Cost", "Latency",
    ]);
    for stats in &models {
        table.add_row(vec![
            Cell::new(&stats.model),
            Cell::new(stats.sample_count),
            Cell::new(format!("{:.1}%", stats.average_score * 100.0)),
            Cell::new(format!("{:.1}%", stats.weighted_score * 100.0)),
            Cell::new(format!("{:.1}%", stats.macro_dataset_score * 100.0)),
            Cell::new(stats.total_tokens),
            Cell::new(format!("${:.4}", stats.total_cost_usd)),
            Cell::new(format!("{}ms", stats.avg_latency_ms)),
        ]);
    }
    eprintln!("\n{table}");

    let mut by_dataset = Table::new();
    let mut header = vec!["Dataset".to_string()];
    header.extend(models.iter().map(|m| m.model.clone()));
    by_dataset.set_header(header);
    for dataset in &report.collection.datasets {
        let mut row = vec![Cell::new(dataset)];
        for stats in &models {
            row.push(Cell::new(match stats.dataset(dataset) {
                Some(g) => format!("{:.1}% (n={})", g.average_score * 100.0, g.count),
                None => "-".to_string(),
            }));
        }
        by_dataset.add_row(row);
    }
    eprintln!("{by_dataset}");
}
