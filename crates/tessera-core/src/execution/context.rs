//! Per-query execution context

use crate::config::ProcessorConfig;
use crate::error::{Problems, Severity};
use crate::execution::analyzer::Analyzer;
use crate::schema::{Schemata, TypeSystem};
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared state of one query execution.
///
/// Cloning is cheap; clones share the variables and the problem list, which
/// lets dependent queries publish values that later stages read.
#[derive(Clone)]
pub struct QueryContext {
    type_system: Arc<dyn TypeSystem>,
    schemata: Arc<dyn Schemata>,
    analyzer: Option<Arc<dyn Analyzer>>,
    variables: Arc<RwLock<HashMap<String, Value>>>,
    problems: Arc<Mutex<Problems>>,
    config: Arc<ProcessorConfig>,
}

impl QueryContext {
    /// Create a context with default configuration and no analyzer
    pub fn new(type_system: Arc<dyn TypeSystem>, schemata: Arc<dyn Schemata>) -> Self {
        Self {
            type_system,
            schemata,
            analyzer: None,
            variables: Arc::new(RwLock::new(HashMap::new())),
            problems: Arc::new(Mutex::new(Problems::new())),
            config: Arc::new(ProcessorConfig::default()),
        }
    }

    /// Attach a relationship analyzer
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Bind a variable before execution
    pub fn with_variable(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_variable(name, value);
        self
    }

    /// Type system
    pub fn type_system(&self) -> &Arc<dyn TypeSystem> {
        &self.type_system
    }

    /// Schemata
    pub fn schemata(&self) -> &Arc<dyn Schemata> {
        &self.schemata
    }

    /// Relationship analyzer, if any
    pub fn analyzer(&self) -> Option<&Arc<dyn Analyzer>> {
        self.analyzer.as_ref()
    }

    /// Configuration
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Current value of a variable
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.read().get(name).cloned()
    }

    /// Bind or rebind a variable
    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.write().insert(name.into(), value.into());
    }

    /// Record a non-fatal problem
    pub fn add_problem(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Error | Severity::Warning => tracing::warn!("{}", message),
            Severity::Info => tracing::debug!("{}", message),
        }
        self.problems.lock().add(severity, message);
    }

    /// Record a warning
    pub fn add_warning(&self, message: impl Into<String>) {
        self.add_problem(Severity::Warning, message);
    }

    /// Record an error-level problem
    pub fn add_error(&self, message: impl Into<String>) {
        self.add_problem(Severity::Error, message);
    }

    /// Snapshot of the problems recorded so far
    pub fn problems(&self) -> Problems {
        self.problems.lock().clone()
    }
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("has_analyzer", &self.analyzer.is_some())
            .field("variables", &self.variables.read().len())
            .field("problems", &self.problems.lock().len())
            .field("config", &self.config)
            .finish()
    }
}
