//! mixeval CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mixeval",
    version,
    about = "Mix datasets with a weighted schema, sample them, and evaluate LLMs in one pass"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a mixing schema and show its normalized weights
    Validate {
        /// Schema file (.json or .toml)
        #[arg(long)]
        schema: PathBuf,

        /// Also load each dataset from this directory and report record counts
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Draw a mixed sample from the datasets in a schema
    Sample {
        /// Schema file (.json or .toml)
        #[arg(long)]
        schema: PathBuf,

        /// Total number of samples
        #[arg(long, default_value = "100")]
        count: usize,

        /// Sampling strategy: weighted, stratified, uniform
        #[arg(long, default_value = "weighted")]
        strategy: String,

        /// Random seed (default: from config, else 42)
        #[arg(long)]
        seed: Option<u64>,

        /// Keep samples grouped by dataset instead of interleaving them
        #[arg(long)]
        no_shuffle: bool,

        /// Dataset root directory (default: from config, else ./data)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output JSONL file
        #[arg(long)]
        output: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Evaluate models on a mixed sample
    Eval {
        /// Sample JSONL file produced by `mixeval sample`
        #[arg(long)]
        samples: PathBuf,

        /// Models to evaluate (e.g. "openai/gpt-4.1-mini,anthropic/claude-sonnet-4-20250514")
        #[arg(long)]
        models: Option<String>,

        /// Max concurrent requests (default: from config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Generation temperature (default: from config)
        #[arg(long)]
        temperature: Option<f64>,

        /// Only evaluate the first N samples
        #[arg(long)]
        limit: Option<usize>,

        /// Reuse cached results and cache new ones under the output directory
        #[arg(long)]
        use_cache: bool,

        /// Collection name shown in reports (default: the samples' root collection)
        #[arg(long)]
        name: Option<String>,

        /// Output directory (default: from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, html, all
        #[arg(long, default_value = "json")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare two eval reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Regression threshold
        #[arg(long, default_value = "0.05")]
        threshold: f64,

        /// Exit code 1 if regressions found
        #[arg(long)]
        fail_on_regression: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config, schema, and datasets
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mixeval=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { schema, data_dir } => commands::validate::execute(schema, data_dir),
        Commands::Sample {
            schema,
            count,
            strategy,
            seed,
            no_shuffle,
            data_dir,
            output,
            config,
        } => commands::sample::execute(commands::sample::SampleArgs {
            schema,
            count,
            strategy,
            seed,
            shuffle: !no_shuffle,
            data_dir,
            output,
            config,
        }),
        Commands::Eval {
            samples,
            models,
            parallelism,
            temperature,
            limit,
            use_cache,
            name,
            output,
            format,
            config,
        } => {
            commands::eval::execute(commands::eval::EvalArgs {
                samples,
                models,
                parallelism,
                temperature,
                limit,
                use_cache,
                name,
                output,
                format,
                config,
            })
            .await
        }
        Commands::Compare {
            baseline,
            current,
            threshold,
            fail_on_regression,
            format,
        } => commands::compare::execute(baseline, current, threshold, fail_on_regression, format),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
