use pipeline_scada::*;

const PIPELINE: &str = r#"
object_types:
  - name: pump_station
    description: Pump station
pipeline_objects:
  - object_type: pump_station
    name: PS-1
    index: 1
tag_templates:
  - object_type: pump_station
    name_template: "PRESSURE_OUT_{index}"
    engineering_units: bar
    max_value: 200
  - object_type: pump_station
    name_template: "PUMP_RUNNING_{index}"
    data_type: boolean
    max_value: 1
alarm_definitions:
  - name: Discharge pressure high
    tag: PRESSURE_OUT_1
    condition: GT
    trigger_value: 100
    severity: HIGH
    message: "{tag} at {value} {units} (limit {trigger_value})"
  - name: Pump state changed
    tag: PUMP_RUNNING_1
    condition: CHANGE
    severity: LOW
"#;

fn engine() -> Engine {
    Engine::new(&Config::from_yaml(PIPELINE).unwrap()).unwrap()
}

fn tag_id(engine: &Engine, name: &str) -> u64 {
    engine.catalog().tag_by_name(name).unwrap().id
}

#[test]
fn test_operator_scenario() {
    let engine = engine();
    let pressure = tag_id(&engine, "PRESSURE_OUT_1");
    let mut events = engine.subscribe(Topic::AlarmUpdates);

    // Below threshold: nothing happens
    let report = engine.ingest_now(pressure, Value::Float(95.0)).unwrap();
    assert!(report.transitions.is_empty());
    assert!(engine.active_alarms().unwrap().is_empty());

    // Crossing raises exactly one alarm
    let report = engine.ingest_now(pressure, Value::Float(120.0)).unwrap();
    assert_eq!(report.raised().count(), 1);
    let alarm = engine.active_alarms().unwrap().remove(0);
    assert_eq!(alarm.state, AlarmState::Active);
    assert_eq!(alarm.severity, Severity::High);
    assert_eq!(alarm.message, "PRESSURE_OUT_1 at 120 bar (limit 100)");

    // Still above: duplicate suppressed
    let report = engine.ingest_now(pressure, Value::Float(130.0)).unwrap();
    assert!(report.transitions.is_empty());
    assert_eq!(engine.active_alarms().unwrap().len(), 1);

    // Operator acknowledges
    let acked = engine.acknowledge(alarm.id, 7).unwrap();
    assert_eq!(acked.state, AlarmState::Acknowledged);
    assert_eq!(acked.acknowledged_by, Some(7));
    assert!(acked.acknowledged_at.is_some());
    assert!(engine.active_alarms().unwrap().is_empty());
    assert_eq!(engine.open_alarms().unwrap().len(), 1);

    // Back to normal, but acknowledged alarms wait for the operator
    let report = engine.ingest_now(pressure, Value::Float(50.0)).unwrap();
    assert!(report.transitions.is_empty());
    assert_eq!(engine.alarm(alarm.id).unwrap().state, AlarmState::Acknowledged);

    let resolved = engine.resolve(alarm.id).unwrap();
    assert_eq!(resolved.state, AlarmState::Resolved);
    assert!(resolved.resolved_at.is_some());

    let err = engine.acknowledge(alarm.id, 7).unwrap_err();
    assert!(matches!(
        err,
        ScadaError::InvalidTransition {
            from: AlarmState::Resolved,
            to: AlarmState::Acknowledged,
            ..
        }
    ));

    let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv())
        .map(|e| e.kind())
        .collect();
    assert_eq!(kinds, vec!["alarm_raised", "alarm_acknowledged", "alarm_resolved"]);
}

#[test]
fn test_auto_resolve_at_threshold() {
    let engine = engine();
    let pressure = tag_id(&engine, "PRESSURE_OUT_1");

    engine.ingest_now(pressure, Value::Float(101.0)).unwrap();
    // GT is strict, so the threshold itself clears the alarm
    let report = engine.ingest_now(pressure, Value::Float(100.0)).unwrap();
    assert_eq!(report.resolved().count(), 1);
    assert!(engine.active_alarms().unwrap().is_empty());

    // A new crossing raises a new alarm
    let report = engine.ingest_now(pressure, Value::Float(150.0)).unwrap();
    let again = report.raised().next().unwrap();
    assert_eq!(engine.alarms(&AlarmFilter::default()).unwrap().len(), 2);
    assert_eq!(engine.active_alarms().unwrap()[0].id, again.id);
}

#[test]
fn test_change_alarm_on_boolean_tag() {
    let engine = engine();
    let pump = tag_id(&engine, "PUMP_RUNNING_1");

    // First value never fires
    assert!(engine
        .ingest_now(pump, Value::Boolean(false))
        .unwrap()
        .transitions
        .is_empty());
    assert!(engine
        .ingest_now(pump, Value::Boolean(false))
        .unwrap()
        .transitions
        .is_empty());

    let report = engine.ingest_now(pump, Value::Boolean(true)).unwrap();
    assert_eq!(report.raised().count(), 1);
    // Empty message template falls back to the definition name
    assert_eq!(report.raised().next().unwrap().message, "Pump state changed");

    // Same value again: condition no longer holds, ACTIVE alarm clears
    let report = engine.ingest_now(pump, Value::Boolean(true)).unwrap();
    assert_eq!(report.resolved().count(), 1);
}

#[test]
fn test_rejected_values_leave_no_trace() {
    let engine = engine();
    let pressure = tag_id(&engine, "PRESSURE_OUT_1");
    let mut updates = engine.subscribe(Topic::TagUpdates);

    assert!(matches!(
        engine.ingest_now(pressure, Value::from("high")),
        Err(ScadaError::InvalidValue(_))
    ));
    assert!(matches!(
        engine.ingest(pressure, Value::Float(1.0), 150, chrono::Utc::now()),
        Err(ScadaError::InvalidValue(_))
    ));
    assert!(matches!(
        engine.ingest_now(9999, Value::Float(1.0)),
        Err(ScadaError::UnknownTag(9999))
    ));

    assert!(engine.latest_value(pressure).unwrap().is_none());
    assert!(updates.try_recv().is_none());
    assert_eq!(engine.stats().values_rejected, 3);
}

#[test]
fn test_disabled_definition_is_ignored() {
    let engine = engine();
    let pressure = tag_id(&engine, "PRESSURE_OUT_1");
    let definition = engine
        .catalog()
        .definitions()
        .into_iter()
        .find(|d| d.tag_id == pressure)
        .unwrap();

    engine
        .catalog()
        .set_definition_enabled(definition.id, false)
        .unwrap();
    assert!(engine
        .ingest_now(pressure, Value::Float(150.0))
        .unwrap()
        .transitions
        .is_empty());
}

#[test]
fn test_archived_tag_still_ingests() {
    let engine = engine();
    let pressure = tag_id(&engine, "PRESSURE_OUT_1");
    engine.catalog().archive_tag(pressure).unwrap();

    let report = engine.ingest_now(pressure, Value::Float(150.0)).unwrap();
    assert_eq!(report.raised().count(), 1);
}
