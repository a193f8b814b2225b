//! Central eval engine orchestrator.
//!
//! Runs every sample of a mixed sample against every model in one pass, with
//! bounded parallelism, retries on transient provider errors, and an optional
//! result cache for resuming interrupted runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::error::ProviderError;
use crate::report::{CollectionSummary, EvalReport};
use crate::results::{ModelLabels, SampleResult};
use crate::sampler::MixedSample;
use crate::scoring::{extract_answer, render_prompt, score};
use crate::statistics::compute_aggregate_stats;
use crate::traits::{GenerateRequest, LlmProvider};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Configuration for the eval engine.
#[derive(Debug, Clone)]
pub struct EvalEngineConfig {
    /// Maximum concurrent requests.
    pub parallelism: usize,
    /// Temperature for generation.
    pub temperature: f64,
    /// Max tokens for generation.
    pub max_tokens: u32,
    /// Retries on provider errors.
    pub max_retries_per_sample: u32,
    /// Initial delay between retries; doubles on each retry.
    pub retry_delay: Duration,
    /// System prompt used for every sample, overriding per-dataset prompts.
    pub system_prompt_override: Option<String>,
}

impl Default for EvalEngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            temperature: 0.0,
            max_tokens: 2048,
            max_retries_per_sample: 3,
            retry_delay: Duration::from_secs(1),
            system_prompt_override: None,
        }
    }
}

/// Which model to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Provider name (e.g. "openai").
    pub provider: String,
    /// Model identifier (e.g. "gpt-4.1-mini").
    pub model: String,
}

impl ModelSpec {
    /// Parse `provider/model`, or a bare model name served by `default_provider`.
    ///
    /// Only the first `/` separates the provider, so `ollama/org/model:7b`
    /// keeps `org/model:7b` as the model.
    pub fn parse(spec: &str, default_provider: &str) -> Self {
        match spec.trim().split_once('/') {
            Some((provider, model)) => ModelSpec {
                provider: provider.to_string(),
                model: model.to_string(),
            },
            None => ModelSpec {
                provider: default_provider.to_string(),
                model: spec.trim().to_string(),
            },
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_sample_start(&self, index: usize, model: &str);
    fn on_sample_complete(&self, result: &SampleResult);
    fn on_sample_error(&self, index: usize, model: &str, error: &str);
    fn on_run_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_sample_start(&self, _: usize, _: &str) {}
    fn on_sample_complete(&self, _: &SampleResult) {}
    fn on_sample_error(&self, _: usize, _: &str, _: &str) {}
    fn on_run_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// The central eval engine.
pub struct EvalEngine {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    config: EvalEngineConfig,
    cache: Option<Arc<ResultCache>>,
}

impl EvalEngine {
    pub fn new(providers: HashMap<String, Arc<dyn LlmProvider>>, config: EvalEngineConfig) -> Self {
        Self {
            providers,
            config,
            cache: None,
        }
    }

    /// Reuse and record results in `cache`.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Evaluate a mixed sample against the given models.
    pub async fn run(
        &self,
        collection_name: &str,
        samples: &[MixedSample],
        models: &[ModelSpec],
        progress: &dyn ProgressReporter,
    ) -> Result<EvalReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

        let mut results = Vec::new();
        let mut futures = FuturesUnordered::new();
        let mut evaluated: Vec<&ModelSpec> = Vec::new();

        for model_spec in models {
            let Some(provider) = self.providers.get(&model_spec.provider) else {
                tracing::warn!("provider '{}' not found, skipping", model_spec.provider);
                continue;
            };
            evaluated.push(model_spec);

            let cached = match &self.cache {
                Some(cache) => cache.load(&model_spec.provider, &model_spec.model)?,
                None => HashMap::new(),
            };
            let mut reused = 0usize;

            for sample in samples {
                if let Some(hit) = cached.get(&sample.index) {
                    if hit.record_id == sample.record.id && hit.dataset == sample.dataset {
                        progress.on_sample_complete(hit);
                        results.push(hit.clone());
                        reused += 1;
                        continue;
                    }
                }

                let provider = Arc::clone(provider);
                let semaphore = Arc::clone(&semaphore);
                let sample = sample.clone();
                let model = model_spec.model.clone();
                let provider_name = model_spec.provider.clone();
                let config = self.config.clone();

                futures.push(async move {
                    let index = sample.index;
                    let ctx_model = model.clone();
                    let inner = async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                        progress.on_sample_start(sample.index, &model);
                        evaluate_sample(provider.as_ref(), &sample, &model, &provider_name, &config, run_id)
                            .await
                    };
                    (index, ctx_model, inner.await)
                });
            }

            if reused > 0 {
                tracing::info!(model = %model_spec.model, reused, "reusing cached results");
            }
        }

        let total = futures.len() + results.len();
        let mut completed = results.len();
        let mut failed = 0usize;

        while let Some((index, model, result)) = futures.next().await {
            match result {
                Ok(sample_result) => {
                    if let Some(cache) = &self.cache {
                        if let Err(e) = cache.append(&sample_result) {
                            tracing::warn!("failed to cache result {index} for {model}: {e:#}");
                        }
                    }
                    progress.on_sample_complete(&sample_result);
                    results.push(sample_result);
                    completed += 1;
                }
                Err(e) => {
                    tracing::error!("sample {index} failed for {model}: {e:#}");
                    progress.on_sample_error(index, &model, &e.to_string());
                    failed += 1;
                }
            }
        }

        let elapsed = start.elapsed();
        progress.on_run_complete(total, completed, failed, elapsed);

        results.sort_by(|a, b| {
            a.model
                .cmp(&b.model)
                .then_with(|| a.provider.cmp(&b.provider))
                .then(a.index.cmp(&b.index))
        });
        let aggregate = compute_aggregate_stats(&results);

        let mut datasets: Vec<String> = Vec::new();
        for s in samples {
            if !datasets.contains(&s.dataset) {
                datasets.push(s.dataset.clone());
            }
        }

        Ok(EvalReport {
            id: run_id,
            created_at: chrono::Utc::now(),
            collection: CollectionSummary {
                name: collection_name.to_string(),
                sample_count: samples.len(),
                datasets,
            },
            models_evaluated: evaluated_labels(&evaluated),
            results,
            aggregate,
            failed_samples: failed,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

/// Names of the models that actually ran, without repeats.
fn evaluated_labels(evaluated: &[&ModelSpec]) -> Vec<String> {
    let labels = ModelLabels::new(
        evaluated
            .iter()
            .map(|m| (m.provider.as_str(), m.model.as_str())),
    );
    let mut names = Vec::new();
    for m in evaluated {
        let name = labels.label(&m.provider, &m.model);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Ask one model about one sample and score the answer.
///
/// Transient provider errors are retried with exponential backoff; a rate
/// limit's retry-after hint replaces the current delay. Permanent errors
/// return immediately.
async fn evaluate_sample(
    provider: &dyn LlmProvider,
    sample: &MixedSample,
    model: &str,
    provider_name: &str,
    config: &EvalEngineConfig,
    run_id: Uuid,
) -> Result<SampleResult> {
    let request = GenerateRequest {
        model: model.to_string(),
        prompt: render_prompt(&sample.record, sample.prompt_template.as_deref()),
        system_prompt: config
            .system_prompt_override
            .clone()
            .or_else(|| sample.system_prompt.clone()),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        stop_sequences: vec![],
    };

    let mut last_error = None;
    let mut retry_delay = config.retry_delay;
    for retry in 0..=config.max_retries_per_sample {
        if retry > 0 {
            tokio::time::sleep(retry_delay).await;
            retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
        }
        match provider.generate(&request).await {
            Ok(response) => {
                let prediction =
                    extract_answer(sample.metric, &response.content, sample.record.choices.len());
                let mut result = SampleResult::for_sample(sample, model, provider_name, run_id);
                result.score = score(sample.metric, &prediction, &sample.record);
                result.prediction = prediction;
                result.response = response.content;
                result.latency_ms = response.latency_ms;
                result.token_usage = response.token_usage;
                return Ok(result);
            }
            Err(e) => {
                if let Some(provider_err) = e.downcast_ref::<ProviderError>() {
                    if provider_err.is_permanent() {
                        return Err(e);
                    }
                    if let Some(ms) = provider_err.retry_after_ms() {
                        retry_delay = Duration::from_millis(ms).min(MAX_RETRY_DELAY);
                    }
                }
                tracing::debug!(sample = sample.index, retry, "provider error: {e:#}");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetRecord;
    use crate::results::TokenUsage;
    use crate::scoring::Metric;
    use crate::traits::{GenerateResponse, ModelInfo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    type Script = Box<dyn Fn(u32, &GenerateRequest) -> anyhow::Result<String> + Send + Sync>;

    /// Provider whose replies come from a closure of (call number, request).
    struct ScriptedProvider {
        script: Script,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(script: impl Fn(u32, &GenerateRequest) -> anyhow::Result<String> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let content = (self.script)(call, request)?;
            Ok(GenerateResponse {
                content,
                model: request.model.clone(),
                token_usage: TokenUsage {
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    total_tokens: 2,
                    estimated_cost_usd: 0.0,
                },
                latency_ms: 1,
            })
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn samples(n: usize) -> Vec<MixedSample> {
        (0..n)
            .map(|i| MixedSample {
                index: i,
                dataset: if i % 2 == 0 { "even" } else { "odd" }.into(),
                subset: "default".into(),
                task_type: "math".into(),
                tags: vec![],
                hierarchy: vec!["mix".into()],
                weight: 0.5,
                metric: Metric::Numeric,
                prompt_template: Some("What is {question}?".into()),
                system_prompt: None,
                record: DatasetRecord {
                    id: format!("q{i}"),
                    question: format!("{i} + 1"),
                    choices: vec![],
                    answer: (i + 1).to_string(),
                    metadata: serde_json::Value::Null,
                },
            })
            .collect()
    }

    /// Answers "n + 1" questions correctly by parsing the prompt.
    fn solver(_: u32, req: &GenerateRequest) -> anyhow::Result<String> {
        let n: usize = req
            .prompt
            .trim_start_matches("What is ")
            .split(' ')
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("bad prompt: {}", req.prompt))?;
        Ok(format!("Answer: {}", n + 1))
    }

    fn fast_config() -> EvalEngineConfig {
        EvalEngineConfig {
            parallelism: 2,
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn engine_with(provider: Arc<ScriptedProvider>, config: EvalEngineConfig) -> EvalEngine {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert("scripted".into(), provider);
        EvalEngine::new(providers, config)
    }

    fn model(name: &str) -> ModelSpec {
        ModelSpec {
            provider: "scripted".into(),
            model: name.into(),
        }
    }

    #[test]
    fn parse_model_spec() {
        assert_eq!(
            ModelSpec::parse("openai/gpt-4.1", "anthropic"),
            ModelSpec {
                provider: "openai".into(),
                model: "gpt-4.1".into()
            }
        );
        assert_eq!(ModelSpec::parse(" llama3 ", "ollama").provider, "ollama");
        assert_eq!(ModelSpec::parse("ollama/org/m:7b", "x").model, "org/m:7b");
    }

    #[tokio::test]
    async fn evaluates_every_sample_for_every_model() {
        let provider = ScriptedProvider::new(solver);
        let engine = engine_with(provider.clone(), fast_config());
        let data = samples(6);

        let report = engine
            .run("mix", &data, &[model("a"), model("b")], &NoopReporter)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 12);
        assert_eq!(provider.calls(), 12);
        assert_eq!(report.failed_samples, 0);
        assert_eq!(report.collection.datasets, vec!["even", "odd"]);
        assert_eq!(report.models_evaluated, vec!["a", "b"]);
        assert!(report.results.iter().all(|r| r.score == 1.0));
        assert_eq!(report.results[0].model, "a");
        assert_eq!(report.results[0].index, 0);
        assert_eq!(report.results[0].prediction, "1");
        let stats = &report.aggregate.per_model["a"];
        assert_eq!(stats.per_dataset.len(), 2);
        assert_eq!(stats.average_score, 1.0);
    }

    #[tokio::test]
    async fn wrong_answers_score_zero() {
        let provider = ScriptedProvider::new(|_, _| Ok("Answer: -1".into()));
        let engine = engine_with(provider, fast_config());
        let report = engine
            .run("mix", &samples(3), &[model("a")], &NoopReporter)
            .await
            .unwrap();
        assert!(report.results.iter().all(|r| r.score == 0.0));
        assert_eq!(report.aggregate.per_model["a"].average_score, 0.0);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let provider = ScriptedProvider::new(|call, req| {
            if call == 0 {
                Err(ProviderError::RateLimited { retry_after_ms: 1 }.into())
            } else {
                solver(call, req)
            }
        });
        let engine = engine_with(provider.clone(), fast_config());
        let report = engine
            .run("mix", &samples(1), &[model("a")], &NoopReporter)
            .await
            .unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let provider = ScriptedProvider::new(|_, _| {
            Err(ProviderError::AuthenticationFailed("bad key".into()).into())
        });
        let engine = engine_with(provider.clone(), fast_config());
        let report = engine
            .run("mix", &samples(3), &[model("a")], &NoopReporter)
            .await
            .unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.failed_samples, 3);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let provider =
            ScriptedProvider::new(|_, _| Err(ProviderError::Timeout(1).into()));
        let config = EvalEngineConfig {
            max_retries_per_sample: 2,
            ..fast_config()
        };
        let engine = engine_with(provider.clone(), config);
        let report = engine
            .run("mix", &samples(1), &[model("a")], &NoopReporter)
            .await
            .unwrap();
        assert_eq!(report.failed_samples, 1);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn unknown_provider_is_skipped() {
        let provider = ScriptedProvider::new(solver);
        let engine = engine_with(provider.clone(), fast_config());
        let missing = ModelSpec {
            provider: "nowhere".into(),
            model: "x".into(),
        };
        let report = engine
            .run("mix", &samples(2), &[missing, model("a")], &NoopReporter)
            .await
            .unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(provider.calls(), 2);
        assert_eq!(report.models_evaluated, vec!["a"]);
        assert!(!report.aggregate.per_model.contains_key("x"));
    }

    #[tokio::test]
    async fn system_prompt_override_wins() {
        let provider = ScriptedProvider::new(|call, req| {
            assert_eq!(req.system_prompt.as_deref(), Some("be terse"));
            solver(call, req)
        });
        let config = EvalEngineConfig {
            system_prompt_override: Some("be terse".into()),
            ..fast_config()
        };
        let mut data = samples(1);
        data[0].system_prompt = Some("dataset prompt".into());
        let engine = engine_with(provider, config);
        let report = engine
            .run("mix", &data, &[model("a")], &NoopReporter)
            .await
            .unwrap();
        assert_eq!(report.results.len(), 1);
    }

    #[tokio::test]
    async fn cache_resumes_run() {
        let dir = tempfile::tempdir().unwrap();
        let data = samples(4);

        let first = ScriptedProvider::new(solver);
        let engine = engine_with(first.clone(), fast_config())
            .with_cache(ResultCache::new(dir.path()).unwrap());
        engine
            .run("mix", &data, &[model("a")], &NoopReporter)
            .await
            .unwrap();
        assert_eq!(first.calls(), 4);

        let second = ScriptedProvider::new(|_, _| anyhow::bail!("should not be called"));
        let engine = engine_with(second.clone(), fast_config())
            .with_cache(ResultCache::new(dir.path()).unwrap());
        let report = engine
            .run("mix", &data, &[model("a")], &NoopReporter)
            .await
            .unwrap();
        assert_eq!(second.calls(), 0);
        assert_eq!(report.results.len(), 4);
        assert_eq!(report.aggregate.per_model["a"].average_score, 1.0);
    }

    #[tokio::test]
    async fn cache_ignores_mismatched_records() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(ScriptedProvider::new(solver), fast_config())
            .with_cache(ResultCache::new(dir.path()).unwrap());
        engine
            .run("mix", &samples(2), &[model("a")], &NoopReporter)
            .await
            .unwrap();

        let mut changed = samples(2);
        changed[1].record.id = "different".into();
        let provider = ScriptedProvider::new(solver);
        let engine = engine_with(provider.clone(), fast_config())
            .with_cache(ResultCache::new(dir.path()).unwrap());
        engine
            .run("mix", &changed, &[model("a")], &NoopReporter)
            .await
            .unwrap();
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn same_model_id_on_two_providers_stays_separate() {
        let dir = tempfile::tempdir().unwrap();
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert("local".into(), ScriptedProvider::new(solver));
        providers.insert(
            "hosted".into(),
            ScriptedProvider::new(|_, _| Ok("Answer: 0".into())),
        );
        let engine = EvalEngine::new(providers, fast_config())
            .with_cache(ResultCache::new(dir.path()).unwrap());
        let spec = |provider: &str| ModelSpec {
            provider: provider.into(),
            model: "llama3".into(),
        };

        let report = engine
            .run("mix", &samples(3), &[spec("local"), spec("hosted")], &NoopReporter)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 6);
        assert_eq!(report.models_evaluated, vec!["local/llama3", "hosted/llama3"]);
        assert_eq!(report.aggregate.per_model["local/llama3"].average_score, 1.0);
        assert_eq!(report.aggregate.per_model["hosted/llama3"].average_score, 0.0);

        let cache = ResultCache::new(dir.path()).unwrap();
        assert_eq!(cache.load("local", "llama3").unwrap().len(), 3);
        assert!(cache
            .load("hosted", "llama3")
            .unwrap()
            .values()
            .all(|r| r.score == 0.0));
    }
}
