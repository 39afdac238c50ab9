//! Compiler and runtime configuration
//!
//! Loaded from JSON (string or file), with a couple of environment
//! overrides for deployment tuning. Every field has a default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment override for [`PipelineSettings::backlog_warning`]
pub const ENV_BACKLOG_WARNING: &str = "NODE_COMPILER_BACKLOG_WARNING";
/// Environment override for [`ScriptLimits::max_operations`]
pub const ENV_SCRIPT_MAX_OPERATIONS: &str = "NODE_COMPILER_SCRIPT_MAX_OPERATIONS";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    pub pipeline: PipelineSettings,
    pub script: ScriptLimits,
}

/// Runtime settings for compiled pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Queued items at which a fan-out branch is logged as lagging
    ///
    /// Fan-out queues are unbounded so a slow branch never stalls its
    /// siblings; this only controls when the backlog is reported.
    pub backlog_warning: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            backlog_warning: 64,
        }
    }
}

/// Sandbox limits for expression nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptLimits {
    /// Maximum operations per evaluation
    pub max_operations: u64,
    pub max_expr_depth: usize,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    /// Exclusive for literals: `[a, b]` needs a limit of at least 3
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
            max_expr_depth: 64,
            max_call_levels: 32,
            max_string_size: 10_000,
            max_array_size: 1_000,
            max_map_size: 1_000,
        }
    }
}

impl CompilerConfig {
    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_BACKLOG_WARNING) {
            match raw.trim().parse::<usize>() {
                Ok(items) if items > 0 => self.pipeline.backlog_warning = items,
                _ => log::warn!("Ignoring invalid {}={:?}", ENV_BACKLOG_WARNING, raw),
            }
        }
        if let Some(raw) = lookup(ENV_SCRIPT_MAX_OPERATIONS) {
            match raw.trim().parse::<u64>() {
                Ok(ops) => self.script.max_operations = ops,
                Err(_) => log::warn!("Ignoring invalid {}={:?}", ENV_SCRIPT_MAX_OPERATIONS, raw),
            }
        }
        self
    }

    /// Backlog warning threshold, never zero
    pub(crate) fn backlog_warning(&self) -> usize {
        self.pipeline.backlog_warning.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.pipeline.backlog_warning, 64);
        assert_eq!(config.script.max_operations, 100_000);
        assert_eq!(config.script.max_call_levels, 32);
    }

    #[test]
    fn test_partial_json() {
        let config = CompilerConfig::from_json_str(r#"{"script": {"maxOperations": 50}}"#).unwrap();
        assert_eq!(config.script.max_operations, 50);
        assert_eq!(config.script.max_expr_depth, 64);
        assert_eq!(config.pipeline.backlog_warning, 64);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"pipeline": {{"backlogWarning": 8}}}}"#).unwrap();
        let config = CompilerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.backlog_warning, 8);

        assert!(CompilerConfig::from_file("/nonexistent/config.json").is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BACKLOG_WARNING, "16"),
            (ENV_SCRIPT_MAX_OPERATIONS, "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = CompilerConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.pipeline.backlog_warning, 16);
        assert_eq!(config.script.max_operations, 100_000);
    }

    #[test]
    fn test_zero_backlog_warning_is_clamped() {
        let mut config = CompilerConfig::default();
        config.pipeline.backlog_warning = 0;
        assert_eq!(config.backlog_warning(), 1);
    }
}
