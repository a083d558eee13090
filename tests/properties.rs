use pipeline_scada::model::TagId;
use pipeline_scada::*;
use proptest::prelude::*;

const PIPELINE: &str = r#"
object_types:
  - name: valve
pipeline_objects:
  - { object_type: valve, name: V-1, index: 1 }
tag_templates:
  - { object_type: valve, name_template: "POSITION_{index}", max_value: 4 }
  - { object_type: valve, name_template: "DP_{index}", max_value: 200 }
alarm_definitions:
  - { name: Valve moved, tag: POSITION_1, condition: CHANGE }
  - { name: Differential pressure high, tag: DP_1, condition: GT, trigger_value: 100 }
"#;

fn engine() -> (Engine, TagId, TagId) {
    let engine = Engine::new(&Config::from_yaml(PIPELINE).unwrap()).unwrap();
    let position = engine.catalog().tag_by_name("POSITION_1").unwrap().id;
    let dp = engine.catalog().tag_by_name("DP_1").unwrap().id;
    (engine, position, dp)
}

proptest! {
    #[test]
    fn change_fires_only_when_value_moves(positions in prop::collection::vec(0u8..4, 1..60)) {
        let (engine, position, _) = engine();
        let mut previous: Option<u8> = None;
        let mut open = false;

        for p in positions {
            let report = engine.ingest_now(position, Value::Float(p as f64)).unwrap();
            let moved = matches!(previous, Some(prev) if prev != p);

            if moved && !open {
                prop_assert_eq!(report.raised().count(), 1);
                open = true;
            } else if !moved && open {
                prop_assert_eq!(report.resolved().count(), 1);
                open = false;
            } else {
                prop_assert!(report.transitions.is_empty());
            }
            previous = Some(p);
        }

        prop_assert_eq!(engine.active_alarms().unwrap().len(), open as usize);
    }

    #[test]
    fn gt_alarm_tracks_threshold(readings in prop::collection::vec(0.0f64..200.0, 1..80)) {
        let (engine, _, dp) = engine();
        let mut open = false;
        let mut raised = 0;

        for r in readings {
            let report = engine.ingest_now(dp, Value::Float(r)).unwrap();
            prop_assert!(report.failures.is_empty());

            if r > 100.0 && !open {
                prop_assert_eq!(report.raised().count(), 1);
                open = true;
                raised += 1;
            } else if r <= 100.0 && open {
                prop_assert_eq!(report.resolved().count(), 1);
                open = false;
            } else {
                prop_assert!(report.transitions.is_empty());
            }

            // Never more than one open alarm per definition
            prop_assert!(engine.active_alarms().unwrap().len() <= 1);
        }

        let stats = engine.alarm_stats().unwrap();
        prop_assert_eq!(stats.total, raised);
        prop_assert_eq!(stats.active, open as usize);
    }

    #[test]
    fn acknowledged_alarm_survives_until_resolved(readings in prop::collection::vec(0.0f64..200.0, 1..40)) {
        let (engine, _, dp) = engine();
        engine.ingest_now(dp, Value::Float(150.0)).unwrap();
        let alarm = engine.active_alarms().unwrap().remove(0);
        engine.acknowledge(alarm.id, 1).unwrap();

        for r in readings {
            let report = engine.ingest_now(dp, Value::Float(r)).unwrap();
            prop_assert!(report.transitions.is_empty());
        }
        prop_assert_eq!(engine.alarm(alarm.id).unwrap().state, AlarmState::Acknowledged);

        engine.resolve(alarm.id).unwrap();
        prop_assert!(engine.resolve(alarm.id).is_err());
    }
}
