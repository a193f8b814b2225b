//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use mixeval_core::report::EvalReport;
use mixeval_core::statistics::{GroupStats, ModelStats};

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn percent(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

/// Models in name order.
fn sorted_models(report: &EvalReport) -> Vec<&ModelStats> {
    let mut models: Vec<&ModelStats> = report.aggregate.per_model.values().collect();
    models.sort_by(|a, b| a.model.cmp(&b.model));
    models
}

/// Generate an HTML report from an eval report.
pub fn generate_html(report: &EvalReport) -> String {
    let models = sorted_models(report);
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>mixeval report: {}</title>\n",
        html_escape(&report.collection.name)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    html.push_str("<header>\n");
    html.push_str("<h1>mixeval report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Collection: <strong>{}</strong> | {} samples from {} datasets | {} models | {}</p>\n",
        html_escape(&report.collection.name),
        report.collection.sample_count,
        report.collection.datasets.len(),
        report.models_evaluated.len(),
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if report.failed_samples > 0 {
        html.push_str(&format!(
            "<p class=\"warning\">{} samples failed and are not scored.</p>\n",
            report.failed_samples
        ));
    }
    html.push_str("</header>\n");

    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Model</th><th>Samples</th><th>Average</th><th>Weighted</th><th>Dataset macro</th><th>Tokens</th><th>Cost</th><th>Avg Latency</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for stats in &models {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>${:.4}</td><td>{}ms</td></tr>\n",
            html_escape(&stats.model),
            stats.sample_count,
            percent(stats.average_score),
            percent(stats.weighted_score),
            percent(stats.macro_dataset_score),
            stats.total_tokens,
            stats.total_cost_usd,
            stats.avg_latency_ms,
        ));
    }
    html.push_str("</tbody></table>\n");

    if !models.is_empty() {
        html.push_str(&generate_bar_chart(&models));
    }
    html.push_str("</section>\n");

    html.push_str(&group_table("By dataset", &models, |s| &s.per_dataset));
    html.push_str(&group_table("By subset", &models, |s| &s.per_subset));
    html.push_str(&group_table("By task type", &models, |s| &s.per_task_type));
    html.push_str(&group_table("By tag", &models, |s| &s.per_tag));
    html.push_str(&group_table("By category", &models, |s| &s.per_category));

    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Samples</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr>");
    for (col, name) in ["#", "Dataset", "Subset", "Model", "Prediction", "Gold", "Score"]
        .iter()
        .enumerate()
    {
        html.push_str(&format!("<th onclick=\"sortTable({col})\">{name}</th>"));
    }
    html.push_str("</tr></thead>\n");
    html.push_str("<tbody>\n");

    for r in &report.results {
        let class = if r.is_correct() {
            "pass"
        } else if r.score > 0.0 {
            "partial"
        } else {
            "fail"
        };
        html.push_str(&format!(
            "<tr class=\"{}\" title=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td></tr>\n",
            class,
            html_escape(&r.response),
            r.index,
            html_escape(&r.dataset),
            html_escape(&r.subset),
            html_escape(&r.model),
            html_escape(&r.prediction),
            html_escape(&r.gold),
            r.score
        ));
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(report).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// A table with one row per group name and one score column per model.
fn group_table<F>(title: &str, models: &[&ModelStats], groups: F) -> String
where
    F: Fn(&ModelStats) -> &Vec<GroupStats>,
{
    let mut names: Vec<&str> = models
        .iter()
        .flat_map(|m| groups(m).iter().map(|g| g.name.as_str()))
        .collect();
    names.sort_unstable();
    names.dedup();
    if names.is_empty() {
        return String::new();
    }

    let mut html = format!("<section class=\"groups\">\n<h2>{}</h2>\n", html_escape(title));
    html.push_str("<table class=\"group-table\">\n<thead><tr><th>Group</th>");
    for m in models {
        html.push_str(&format!("<th>{}</th>", html_escape(&m.model)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for name in names {
        html.push_str(&format!("<tr><td>{}</td>", html_escape(name)));
        for m in models {
            match groups(m).iter().find(|g| g.name == name) {
                Some(g) => html.push_str(&format!(
                    "<td>{} <span class=\"count\">(n={})</span></td>",
                    percent(g.average_score),
                    g.count
                )),
                None => html.push_str("<td>-</td>"),
            }
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody></table>\n</section>\n");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &EvalReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

fn generate_bar_chart(models: &[&ModelStats]) -> String {
    let bar_height = 30;
    let max_width = 400;
    let padding = 10;
    let label_width = 200;

    let total_height = models.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, stats) in models.iter().enumerate() {
        let score = stats.average_score.clamp(0.0, 1.0);
        let y = i * (bar_height + padding) + padding;
        let width = (score * max_width as f64) as usize;

        let color = if score >= 0.8 {
            "#22c55e"
        } else if score >= 0.5 {
            "#eab308"
        } else {
            "#ef4444"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(&stats.model)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{}</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            percent(score)
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --partial: #fef9c3; --fail: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --partial: #713f12; --fail: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta, .count { color: #6b7280; }
.warning { color: #b45309; font-weight: bold; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); }
.results-table th { cursor: pointer; }
.pass { background: var(--pass); }
.partial { background: var(--partial); }
.fail { background: var(--fail); }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = parseFloat(va), nb = parseFloat(vb);
    const cmp = !isNaN(na) && !isNaN(nb) ? na - nb : va.localeCompare(vb);
    return asc ? cmp : -cmp;
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use mixeval_core::report::CollectionSummary;
    use mixeval_core::results::{SampleResult, TokenUsage};
    use mixeval_core::scoring::Metric;
    use mixeval_core::statistics::compute_aggregate_stats;

    fn result(index: usize, dataset: &str, model: &str, score: f64) -> SampleResult {
        SampleResult {
            index,
            dataset: dataset.into(),
            subset: "default".into(),
            task_type: if dataset == "gsm8k" { "math" } else { "knowledge" }.into(),
            tags: vec!["en".into()],
            hierarchy: vec!["mix".into()],
            weight: 0.5,
            record_id: format!("r{index}"),
            model: model.into(),
            provider: "mock".into(),
            metric: Metric::ExactMatch,
            response: "Answer: <b>x</b>".into(),
            prediction: "x".into(),
            gold: "x".into(),
            score,
            latency_ms: 10,
            token_usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
                estimated_cost_usd: 0.001,
            },
            run_id: uuid::Uuid::nil(),
        }
    }

    fn make_test_report() -> EvalReport {
        let results = vec![
            result(0, "gsm8k", "model-1", 1.0),
            result(1, "arc", "model-1", 0.0),
            result(0, "gsm8k", "model-2", 0.5),
        ];
        EvalReport {
            id: uuid::Uuid::nil(),
            created_at: chrono::Utc::now(),
            collection: CollectionSummary {
                name: "Reasoning <Mix>".into(),
                sample_count: 2,
                datasets: vec!["gsm8k".into(), "arc".into()],
            },
            models_evaluated: vec!["model-1".into(), "model-2".into()],
            aggregate: compute_aggregate_stats(&results),
            results,
            failed_samples: 1,
            duration_ms: 1000,
        }
    }

    #[test]
    fn html_report_contains_required_elements() {
        let html = generate_html(&make_test_report());

        assert!(html.contains("<html"));
        assert!(html.contains("</html>"));
        assert!(html.contains("model-1"));
        assert!(html.contains("model-2"));
        assert!(html.contains("Reasoning &lt;Mix&gt;"));
        assert!(!html.contains("<b>x</b>"));
        assert!(html.contains("By dataset"));
        assert!(html.contains("By task type"));
        assert!(html.contains("1 samples failed"));
        assert!(html.contains("<svg"));
    }

    #[test]
    fn group_table_marks_missing_groups() {
        let report = make_test_report();
        let models = sorted_models(&report);
        let table = group_table("By dataset", &models, |s| &s.per_dataset);
        // model-2 never saw arc
        assert!(table.contains("<td>arc</td><td>0.0% <span class=\"count\">(n=1)</span></td><td>-</td>"));
        assert!(table.contains("<td>gsm8k</td><td>100.0%"));
    }

    #[test]
    fn empty_groups_render_nothing() {
        assert!(group_table("By tag", &[], |s| &s.per_tag).is_empty());
    }

    #[test]
    fn html_report_write_to_file() {
        let report = make_test_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.html");

        write_html_report(&report, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<html"));
    }
}
