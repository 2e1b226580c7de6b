use anyhow::Result;
use tessera_core::{ProcessorConfig, QueryResults};

#[derive(Debug, Clone, Default)]
pub struct OutputContext {
    pub json: bool,
    pub csv: bool,
    pub verbose: bool,
}

impl OutputContext {
    /// Render results in the selected format
    pub fn render(&self, results: &QueryResults, config: &ProcessorConfig) -> Result<String> {
        if self.json {
            return Ok(serde_json::to_string_pretty(&results.to_result_set())?);
        }

        if self.csv {
            let mut lines = Vec::with_capacity(results.row_count() + 1);
            lines.push(
                results
                    .column_names()
                    .iter()
                    .map(|name| csv_field(name))
                    .collect::<Vec<_>>()
                    .join(","),
            );
            let width = results.layout().column_count();
            for tuple in results.tuples() {
                let values: Vec<String> = tuple[..width].iter().map(|v| csv_field(&v.to_string())).collect();
                lines.push(values.join(","));
            }
            return Ok(lines.join("\n"));
        }

        Ok(results.render_table(config))
    }

    /// Problems and timings, written to stderr by the binary
    pub fn diagnostics(&self, results: &QueryResults) -> Vec<String> {
        let mut lines: Vec<String> = results.problems().iter().map(ToString::to_string).collect();
        if self.verbose {
            lines.push(format!("{} row(s)", results.row_count()));
            lines.push(results.statistics().to_string());
            if let Some(trace) = results.plan_trace() {
                lines.push(trace.to_string());
            }
        }
        lines
    }
}

/// Quote a field when it holds a separator, a quote or a line break
fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
