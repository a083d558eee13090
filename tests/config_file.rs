use pipeline_scada::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_engine_from_config_file() {
    let file = write_config(
        r#"
engine:
  queue_capacity: 32
  history_retention: 5
server:
  bind_address: "127.0.0.1:8080"
object_types:
  - name: tank
pipeline_objects:
  - { object_type: tank, name: T-1, index: 1 }
  - { object_type: tank, name: T-2, index: 2 }
tag_templates:
  - { object_type: tank, name_template: "LEVEL_{index}", engineering_units: m, max_value: 20 }
alarm_definitions:
  - { name: Tank 1 low, tag: LEVEL_1, condition: LT, trigger_value: 2, severity: CRITICAL }
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.server.as_ref().unwrap().bind_address, "127.0.0.1:8080");

    let engine = Engine::new(&config).unwrap();
    assert_eq!(engine.hub().capacity(), 32);
    assert_eq!(engine.stats().tag_count, 2);
    assert_eq!(engine.stats().definition_count, 1);

    let level = engine.catalog().tag_by_name("LEVEL_1").unwrap();
    assert_eq!(level.engineering_units, "m");
    for i in 0..10 {
        engine.ingest_now(level.id, Value::Float(10.0 + i as f64)).unwrap();
    }
    // Retention keeps the newest five samples
    let history = engine.history(level.id, 100).unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].value, Value::Float(19.0));

    let report = engine.ingest_now(level.id, Value::Float(1.5)).unwrap();
    let alarm = report.raised().next().unwrap();
    assert_eq!(alarm.severity, Severity::Critical);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ScadaError::Io(_)));
}

#[test]
fn test_malformed_yaml_is_rejected() {
    let file = write_config("alarm_definitions: [ { name: broken");
    assert!(matches!(
        Config::from_file(file.path()),
        Err(ScadaError::Yaml(_))
    ));
}

#[test]
fn test_definition_for_unknown_tag_fails_engine_build() {
    let file = write_config(
        r#"
alarm_definitions:
  - { name: Orphan, tag: NO_SUCH_TAG, condition: GT, trigger_value: 1 }
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    assert!(matches!(Engine::new(&config), Err(ScadaError::Config(_))));
}

#[test]
fn test_zero_queue_capacity_is_rejected() {
    let file = write_config("engine:\n  queue_capacity: 0\n");
    assert!(matches!(
        Config::from_file(file.path()),
        Err(ScadaError::Config(_))
    ));
}

#[test]
fn test_sample_config_loads() {
    let config = Config::from_yaml(include_str!("../configs/pipeline.yaml")).unwrap();
    let engine = Engine::new(&config).unwrap();
    assert!(config.simulation.enabled);
    // 3 per pump station, 1 per valve, 1 hand-made
    assert_eq!(engine.stats().tag_count, 8);
    assert_eq!(engine.stats().definition_count, 6);

    let valve = engine.catalog().tag_by_name("VALVE_OPEN_001").unwrap();
    let report = engine.ingest_now(valve.id, Value::Boolean(false)).unwrap();
    assert_eq!(report.raised().next().unwrap().severity, Severity::Critical);
}
