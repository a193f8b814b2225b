//! Prompt rendering, answer extraction, and per-sample scoring.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetRecord;

/// How a model response is compared to the gold answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Normalized string equality.
    #[default]
    ExactMatch,
    /// Option letter match against a list of choices.
    MultipleChoice,
    /// Numeric equality within a small relative tolerance.
    Numeric,
    /// The response contains the gold answer.
    Contains,
    /// Token-level F1 overlap.
    F1,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::ExactMatch => write!(f, "exact_match"),
            Metric::MultipleChoice => write!(f, "multiple_choice"),
            Metric::Numeric => write!(f, "numeric"),
            Metric::Contains => write!(f, "contains"),
            Metric::F1 => write!(f, "f1"),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "exact_match" | "em" => Ok(Metric::ExactMatch),
            "multiple_choice" | "mc" => Ok(Metric::MultipleChoice),
            "numeric" => Ok(Metric::Numeric),
            "contains" => Ok(Metric::Contains),
            "f1" => Ok(Metric::F1),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

const ANSWER_MARKERS: &[&str] = &["answer is", "answer:", "####"];
const NUMERIC_TOLERANCE: f64 = 1e-6;

/// Render the prompt sent to the model for a record.
///
/// Templates may use `{question}`, `{choices}`, and `{id}`.
pub fn render_prompt(record: &DatasetRecord, template: Option<&str>) -> String {
    let choices = format_choices(&record.choices);
    match template {
        Some(t) => t
            .replace("{question}", &record.question)
            .replace("{choices}", &choices)
            .replace("{id}", &record.id),
        None if record.choices.is_empty() => record.question.clone(),
        None => format!(
            "{}\n\n{}\n\nAnswer with the letter of the correct option.",
            record.question, choices
        ),
    }
}

/// Format choices as a lettered list (`A. ...`).
pub fn format_choices(choices: &[String]) -> String {
    choices
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", option_letter(i), c))
        .collect::<Vec<_>>()
        .join("\n")
}

fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// Pull the answer out of a raw model response.
pub fn extract_answer(metric: Metric, response: &str, n_choices: usize) -> String {
    match metric {
        Metric::MultipleChoice => {
            extract_choice(response, n_choices).map_or_else(|| response.trim().to_string(), String::from)
        }
        Metric::Numeric => after_last_marker(response)
            .and_then(|scope| numbers(scope).into_iter().next())
            .or_else(|| numbers(response).pop())
            .unwrap_or_else(|| response.trim().to_string()),
        Metric::Contains => response.trim().to_string(),
        Metric::ExactMatch | Metric::F1 => after_last_marker(response)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| response.lines().rev().map(str::trim).find(|l| !l.is_empty()))
            .unwrap_or("")
            .trim_end_matches('.')
            .to_string(),
    }
}

fn after_last_marker(text: &str) -> Option<&str> {
    let lower = text.to_ascii_lowercase();
    ANSWER_MARKERS
        .iter()
        .filter_map(|m| lower.rfind(m).map(|pos| pos + m.len()))
        .max()
        .map(|end| &text[end..])
}

fn extract_choice(response: &str, n_choices: usize) -> Option<char> {
    let max = if n_choices == 0 { 26 } else { n_choices.min(26) };
    let in_range = |c: char| c.is_ascii_uppercase() && ((c as u8 - b'A') as usize) < max;

    if let Some(rest) = after_last_marker(response) {
        let mut chars = rest
            .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '(' | '[' | '*' | ':'))
            .chars();
        if let Some(first) = chars.next() {
            let letter = first.to_ascii_uppercase();
            let boundary = chars.next().map_or(true, |c| !c.is_alphanumeric());
            if in_range(letter) && boundary {
                return Some(letter);
            }
        }
    }

    response.split_whitespace().rev().find_map(|token| {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if in_range(c) => Some(c),
            _ => None,
        }
    })
}

/// All numbers in `text`, in order, with thousands separators removed.
fn numbers(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();

    let digit_at = |i: usize| chars.get(i).is_some_and(|n| n.is_ascii_digit());

    for (i, &c) in chars.iter().enumerate() {
        let next_is_digit = digit_at(i + 1);
        // A separator is followed by exactly three digits.
        let thousands = (1..=3).all(|k| digit_at(i + k)) && !digit_at(i + 4);
        if c.is_ascii_digit() {
            current.push(c);
        } else if c == ',' && !current.is_empty() && !current.contains('.') && thousands {
            // thousands separator
        } else if c == '.' && !current.is_empty() && !current.contains('.') && next_is_digit {
            current.push(c);
        } else if c == '-' && current.is_empty() && next_is_digit {
            current.push(c);
        } else if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Lowercase, strip punctuation at token edges, collapse whitespace.
pub fn normalize(text: &str) -> String {
    tokens(text).join(" ")
}

fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Score an extracted prediction against a record's gold answer, in `[0, 1]`.
pub fn score(metric: Metric, prediction: &str, record: &DatasetRecord) -> f64 {
    let hit = |ok: bool| if ok { 1.0 } else { 0.0 };
    match metric {
        Metric::ExactMatch => hit(normalize(prediction) == normalize(&record.answer)),
        Metric::MultipleChoice => match gold_letter(record) {
            Some(gold) => {
                let mut chars = prediction.trim().chars();
                let pred = chars.next().map(|c| c.to_ascii_uppercase());
                hit(pred == Some(gold) && chars.next().is_none())
            }
            None => 0.0,
        },
        Metric::Numeric => {
            let gold = extract_answer(Metric::Numeric, &record.answer, 0);
            match (parse_number(prediction), parse_number(&gold)) {
                (Some(p), Some(g)) => hit((p - g).abs() <= NUMERIC_TOLERANCE * g.abs().max(1.0)),
                _ => 0.0,
            }
        }
        Metric::Contains => {
            let gold = normalize(&record.answer);
            hit(!gold.is_empty() && normalize(prediction).contains(&gold))
        }
        Metric::F1 => token_f1(prediction, &record.answer),
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().replace(',', "").parse::<f64>().ok()
}

fn gold_letter(record: &DatasetRecord) -> Option<char> {
    let answer = record.answer.trim();
    let mut chars = answer.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        let c = c.to_ascii_uppercase();
        if c.is_ascii_uppercase() {
            return Some(c);
        }
    }
    let gold = normalize(answer);
    record
        .choices
        .iter()
        .position(|c| normalize(c) == gold)
        .or_else(|| {
            // Zero-based label index.
            answer
                .parse::<usize>()
                .ok()
                .filter(|&i| i < record.choices.len())
        })
        .map(option_letter)
}

fn token_f1(prediction: &str, gold: &str) -> f64 {
    let pred = tokens(prediction);
    let gold = tokens(gold);
    if pred.is_empty() || gold.is_empty() {
        return if pred.is_empty() && gold.is_empty() { 1.0 } else { 0.0 };
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for t in &gold {
        *counts.entry(t.as_str()).or_default() += 1;
    }
    let mut common = 0usize;
    for t in &pred {
        if let Some(n) = counts.get_mut(t.as_str()) {
            if *n > 0 {
                *n -= 1;
                common += 1;
            }
        }
    }
    if common == 0 {
        return 0.0;
    }
    let precision = common as f64 / pred.len() as f64;
    let recall = common as f64 / gold.len() as f64;
    2.0 * precision * recall / (precision + recall)
}
