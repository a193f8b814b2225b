//! Append-only result cache for resumable evaluation runs.
//!
//! One JSONL file per provider and model. Results are appended as soon as they complete,
//! so an interrupted run can pick up where it stopped.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::results::SampleResult;

pub struct ResultCache {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ResultCache {
    /// Open (and create if needed) a cache directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache directory: {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The cache file for a model served by `provider`.
    ///
    /// Names are escaped so distinct `(provider, model)` pairs never share a file.
    pub fn path_for(&self, provider: &str, model: &str) -> PathBuf {
        self.dir.join(format!(
            "{}+{}.jsonl",
            file_component(provider),
            file_component(model)
        ))
    }

    /// Load cached results for a provider's model, keyed by sample index.
    ///
    /// A malformed final line (an interrupted write) is skipped.
    pub fn load(&self, provider: &str, model: &str) -> Result<HashMap<usize, SampleResult>> {
        let path = self.path_for(provider, model);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read cache: {}", path.display()))?;
        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .collect();

        let mut cached = HashMap::new();
        for (pos, (line_num, line)) in lines.iter().enumerate() {
            match serde_json::from_str::<SampleResult>(line) {
                Ok(result) => {
                    cached.insert(result.index, result);
                }
                Err(e) if pos + 1 == lines.len() => {
                    tracing::warn!(
                        "ignoring truncated cache entry at {}:{}: {e}",
                        path.display(),
                        line_num + 1
                    );
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("corrupt cache entry at {}:{}", path.display(), line_num + 1)
                    });
                }
            }
        }
        Ok(cached)
    }

    /// Append one result. Safe to call from concurrent tasks.
    pub fn append(&self, result: &SampleResult) -> Result<()> {
        let line = serde_json::to_string(result).context("failed to serialize result")?;
        let path = self.path_for(&result.provider, &result.model);
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("cache lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open cache: {}", path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Keep ASCII alphanumerics, `.` and `-`; every other byte becomes `_XX`.
fn file_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-') {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{b:02X}"));
        }
    }
    out
}
