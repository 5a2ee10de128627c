use crate::errors::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub mod manifest;

pub const DEFAULT_CONFIG_FILE: &str = "sqlgrade.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub practice_db: String,
    pub grading_db: String,
    pub sample_suite: PathBuf,
    pub eval_suite: PathBuf,
    pub out_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            practice_db: "practice.db".into(),
            grading_db: "grading.db".into(),
            sample_suite: "sample_tests.enc".into(),
            eval_suite: "eval_tests.enc".into(),
            out_dir: ".".into(),
        }
    }
}

impl RunnerConfig {
    /// Applies `SQLGRADE_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SQLGRADE_PRACTICE_DB") {
            self.practice_db = v;
        }
        if let Some(v) = lookup("SQLGRADE_GRADING_DB") {
            self.grading_db = v;
        }
        if let Some(v) = lookup("SQLGRADE_OUT_DIR") {
            self.out_dir = v.into();
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|k| std::env::var(k).ok().filter(|v| !v.is_empty()));
    }
}

/// Loads the runner config. A missing file at the default location yields defaults.
pub fn load_runner_config(path: Option<&Path>) -> Result<RunnerConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    if !explicit && !path.exists() {
        return Ok(RunnerConfig::default());
    }
    let (cfg, ignored) = load_yaml::<RunnerConfig>(&path)?;
    if !ignored.is_empty() {
        tracing::warn!(
            file = %path.display(),
            keys = ?ignored,
            "ignored unknown config fields"
        );
    }
    Ok(cfg)
}

/// Reads YAML from `path`, collecting the paths of keys the target type ignored.
pub(crate) fn load_yaml<T: DeserializeOwned>(
    path: &Path,
) -> Result<(T, BTreeSet<String>), ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;

    let mut ignored_keys = BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    let value: T = serde_ignored::deserialize(deserializer, |p| {
        ignored_keys.insert(p.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML in {}: {}", path.display(), e)))?;

    Ok((value, ignored_keys))
}
