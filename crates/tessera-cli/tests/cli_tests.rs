//! CLI configuration, session and output tests

use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tessera_cli::commands::{Session, load_plan, parse_plan};
use tessera_cli::config::Config;
use tessera_cli::output::OutputContext;
use tessera_core::{ProcessorConfig, Value};

const STORE: &str = r#"{
  "tables": [{
    "name": "book",
    "columns": [{ "name": "title" }, { "name": "year", "type_name": "LONG" }],
    "nodes": [
      { "location": { "path": "/books/b1" }, "properties": { "title": "Dune", "year": 1965 } },
      { "location": { "path": "/books/b2" }, "properties": { "title": "Solaris, revised", "year": 1961 } },
      { "location": { "path": "/books/b3" }, "properties": { "title": "Neuromancer", "year": 1984 } }
    ]
  }]
}"#;

const SORTED_BOOKS: &str = r#"{
  "type": "SORT",
  "selectors": ["book"],
  "properties": {
    "sort_order_by": {
      "orderings": [{ "operand": { "property_value": { "selector": "book", "property": "year" } } }]
    }
  },
  "children": [{
    "type": "ACCESS",
    "selectors": ["book"],
    "children": [{ "type": "SOURCE", "selectors": ["book"], "properties": { "source_name": "book" } }]
  }]
}"#;

const ALL_BOOKS: &str = r#"{
  "type": "ACCESS",
  "selectors": ["book"],
  "children": [{ "type": "SOURCE", "selectors": ["book"], "properties": { "source_name": "book" } }]
}"#;

fn session() -> Session {
    Session::from_json(STORE, ProcessorConfig::default()).unwrap()
}

#[test]
fn test_config_missing_file_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_from_path(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
    assert!(config.processor.render_locations);
}

#[test]
fn test_config_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");
    let config = Config {
        store: Some("/data/books.json".into()),
        processor: ProcessorConfig {
            max_render_rows: Some(10),
            ..ProcessorConfig::default().with_trace_plan(true)
        },
    };
    config.save(&path).unwrap();
    assert_eq!(Config::load(Some(path.to_str().unwrap())).unwrap(), config);
}

#[test]
fn test_config_partial_processor_section() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "[processor]\nverify_sorted_inputs = true\n").unwrap();
    let config = Config::load_from_path(&path).unwrap();
    assert!(config.store.is_none());
    assert!(config.processor.verify_sorted_inputs);
    assert!(!config.processor.trace_plan);
}

#[test]
fn test_config_default_path() {
    let path = Config::default_path();
    assert!(path.ends_with("tessera/config.toml"));
}

#[test]
fn test_run_plan_from_files() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store.json");
    let plan_path = temp_dir.path().join("plan.json");
    fs::write(&store_path, STORE).unwrap();
    fs::write(&plan_path, SORTED_BOOKS).unwrap();

    let session = Session::open(&store_path, ProcessorConfig::default()).unwrap();
    let (plan, _) = load_plan(&plan_path).unwrap();
    let results = session.run(&plan, Duration::from_micros(5)).unwrap();

    let titles: Vec<String> = results
        .cursor()
        .map(|row| row.value_by_name("title").unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Solaris, revised", "Dune", "Neuromancer"]);
    assert_eq!(results.statistics().planning, Duration::from_micros(5));
}

#[test]
fn test_missing_store_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let err = Session::open(&temp_dir.path().join("none.json"), ProcessorConfig::default())
        .err()
        .unwrap();
    assert!(err.to_string().contains("failed to read store"));
}

#[test]
fn test_bind_variables() {
    let session = session();
    session
        .bind_variables(&["year=1965".to_string(), "title=Dune".to_string()])
        .unwrap();
    assert_eq!(session.context().variable("year"), Some(Value::Long(1965)));
    assert_eq!(session.context().variable("title"), Some(Value::from("Dune")));
    assert!(session.bind_variables(&["nonsense".to_string()]).is_err());
}

#[test]
fn test_csv_output_quotes_fields() {
    let session = session();
    let results = session.run(&parse_plan(SORTED_BOOKS).unwrap(), Duration::ZERO).unwrap();
    let output = OutputContext {
        csv: true,
        ..OutputContext::default()
    };
    let text = output.render(&results, &ProcessorConfig::default()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "title,year");
    assert_eq!(lines[1], "\"Solaris, revised\",1961");
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_json_output_has_columns_and_rows() {
    let session = session();
    let results = session.run(&parse_plan(ALL_BOOKS).unwrap(), Duration::ZERO).unwrap();
    let output = OutputContext {
        json: true,
        ..OutputContext::default()
    };
    let text = output.render(&results, &ProcessorConfig::default()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["columns"], serde_json::json!(["title", "year"]));
    assert_eq!(json["rows"].as_array().unwrap().len(), 3);
}

#[test]
fn test_verbose_diagnostics_include_statistics() {
    let session = session();
    let results = session.run(&parse_plan(ALL_BOOKS).unwrap(), Duration::ZERO).unwrap();
    let quiet = OutputContext::default();
    assert!(quiet.diagnostics(&results).is_empty());

    let verbose = OutputContext {
        verbose: true,
        ..OutputContext::default()
    };
    let lines = verbose.diagnostics(&results);
    assert_eq!(lines[0], "3 row(s)");
    assert!(lines[1].starts_with("plan="));
}

#[test]
fn test_explain_lists_stages() {
    let session = session();
    let description = session.explain(&parse_plan(SORTED_BOOKS).unwrap()).unwrap();
    assert!(description.starts_with("SortValues"));
    assert!(description.contains("Access [book]"));
}
