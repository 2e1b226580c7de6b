use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::schema::StandardTypeSystem;
use tessera_core::{InMemoryStore, PlanNode, ProcessorConfig, QueryContext, QueryProcessor, QueryResults, Statistics, Value};

/// A loaded store together with the processor that reads from it
pub struct Session {
    ctx: QueryContext,
    processor: QueryProcessor,
}

impl Session {
    /// Load a JSON store and prepare a context using `config`
    pub fn open(store_path: &Path, config: ProcessorConfig) -> Result<Self> {
        let text = std::fs::read_to_string(store_path)
            .with_context(|| format!("failed to read store {}", store_path.display()))?;
        Self::from_json(&text, config).with_context(|| format!("invalid store {}", store_path.display()))
    }

    pub fn from_json(store: &str, config: ProcessorConfig) -> Result<Self> {
        let types = Arc::new(StandardTypeSystem::new());
        let store = Arc::new(InMemoryStore::from_json_str(store, types.as_ref())?);
        tracing::debug!("Loaded store with {} nodes", store.node_count());
        let ctx = QueryContext::new(types, Arc::new(store.schemata()))
            .with_analyzer(store.clone())
            .with_config(config);
        Ok(Self {
            ctx,
            processor: QueryProcessor::new(store),
        })
    }

    /// Bind `name=value` pairs; values that parse as JSON keep their type,
    /// anything else is bound as a string
    pub fn bind_variables(&self, bindings: &[String]) -> Result<()> {
        for binding in bindings {
            let Some((name, raw)) = binding.split_once('=') else {
                bail!("variable binding '{}' is not of the form name=value", binding);
            };
            let value = match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(json) => Value::from(&json),
                Err(_) => Value::from(raw),
            };
            self.ctx.set_variable(name.trim(), value);
        }
        Ok(())
    }

    pub fn context(&self) -> &QueryContext {
        &self.ctx
    }

    /// Execute `plan`, timing the plan decoding as the planning phase
    pub fn run(&self, plan: &PlanNode, planning: Duration) -> Result<QueryResults> {
        let stats = Statistics::new(planning, Duration::ZERO);
        let results = self.processor.execute_with_statistics(&self.ctx, plan, stats)?;
        Ok(results)
    }

    pub fn explain(&self, plan: &PlanNode) -> Result<String> {
        Ok(self.processor.explain(&self.ctx, plan)?)
    }
}

/// Read and decode a JSON plan, returning it with the time spent
pub fn load_plan(path: &Path) -> Result<(PlanNode, Duration)> {
    let start = Instant::now();
    let text =
        std::fs::read_to_string(path).with_context(|| format!("failed to read plan {}", path.display()))?;
    let plan = parse_plan(&text).with_context(|| format!("invalid plan {}", path.display()))?;
    Ok((plan, start.elapsed()))
}

pub fn parse_plan(text: &str) -> Result<PlanNode> {
    Ok(serde_json::from_str(text)?)
}
