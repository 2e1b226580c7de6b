//! Processor configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for compiling and executing plans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Attach the compiled stage tree description to the results
    pub trace_plan: bool,
    /// Re-check set-operation inputs that report location order; a
    /// violation records a warning and the input is re-sorted
    pub verify_sorted_inputs: bool,
    /// Maximum number of rows printed by the table renderer
    pub max_render_rows: Option<usize>,
    /// Include location columns in rendered tables
    pub render_locations: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            trace_plan: false,
            verify_sorted_inputs: false,
            max_render_rows: None,
            render_locations: true,
        }
    }
}

impl ProcessorConfig {
    /// Parse configuration from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded processor configuration from {:?}", path);
        Ok(config)
    }

    /// Apply `TESSERA_*` environment overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("TESSERA_TRACE_PLAN") {
            self.trace_plan = value.parse::<bool>().unwrap_or(self.trace_plan);
        }
        if let Ok(value) = std::env::var("TESSERA_VERIFY_SORTED_INPUTS") {
            self.verify_sorted_inputs = value.parse::<bool>().unwrap_or(self.verify_sorted_inputs);
        }
        if let Ok(value) = std::env::var("TESSERA_MAX_RENDER_ROWS") {
            if let Ok(rows) = value.parse::<usize>() {
                self.max_render_rows = Some(rows);
            }
        }
        self
    }

    /// Enable or disable the plan trace
    pub fn with_trace_plan(mut self, trace_plan: bool) -> Self {
        self.trace_plan = trace_plan;
        self
    }

    /// Enable or disable sortedness verification
    pub fn with_verify_sorted_inputs(mut self, verify: bool) -> Self {
        self.verify_sorted_inputs = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ProcessorConfig::default();
        assert!(!config.trace_plan);
        assert!(!config.verify_sorted_inputs);
        assert!(config.render_locations);
        assert_eq!(config.max_render_rows, None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ProcessorConfig::from_toml_str("trace_plan = true\nmax_render_rows = 20\n")
            .unwrap();
        assert!(config.trace_plan);
        assert_eq!(config.max_render_rows, Some(20));
        assert!(config.render_locations);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ProcessorConfig::from_toml_str("trace_plan = \"maybe\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
