//! Automation engine facade: startup, shutdown, telemetry routing, and the
//! rule/program management API.


use homegrowd::engine::{Clock, EngineEvent};
use homegrowd::error::EngineError;
use homegrowd::model::{
    Action, ComparisonOp, Condition, DeviceId, DeviceStatus, Program, Rule, RuleId, Schedule,
    SensorType, Severity,
};
use homegrowd::transport::TransportEvent;
use homegrowd::AutomationEngine;
use tokio::sync::mpsc;

fn build_engine(
    parts: &test_helpers::EngineParts,
) -> (AutomationEngine, mpsc::Receiver<EngineEvent>) {
    AutomationEngine::new(
        test_helpers::test_config(),
        parts.rules.clone(),
        parts.programs.clone(),
        parts.sensors.clone(),
        parts.devices.clone(),
        parts.execution_log.clone(),
        parts.transport.clone(),
        parts.clock.clone(),
    )
}

fn notify_rule(device: &str) -> Rule {
    Rule::new(
        "ph alert",
        vec![Condition::SensorThreshold {
            device_id: DeviceId::new(device),
            sensor_type: SensorType::Ph,
            operator: ComparisonOp::Gt,
            value: 6.5,
        }],
        vec![Action::Notification {
            message: "ph drifting high".to_string(),
            severity: Severity::Warning,
        }],
    )
}

#[tokio::test(start_paused = true)]
async fn test_engine_start_and_stop() {
    let parts = test_helpers::engine_parts();
    let (engine, _events) = build_engine(&parts);
    let (_tx, rx) = mpsc::channel::<TransportEvent>(16);

    engine.start(rx).await.unwrap();
    let status = engine.get_status().await;
    assert!(status.running);
    assert_eq!(status.in_flight_commands, 0);
    assert_eq!(status.rule_poll_interval_secs, 30);
    assert_eq!(status.program_poll_interval_secs, 60);

    engine.stop().await;
    assert!(!engine.get_status().await.running);
}

#[tokio::test(start_paused = true)]
async fn test_engine_double_start_fails() {
    let parts = test_helpers::engine_parts();
    let (engine, _events) = build_engine(&parts);
    let (_tx1, rx1) = mpsc::channel::<TransportEvent>(16);
    let (_tx2, rx2) = mpsc::channel::<TransportEvent>(16);

    engine.start(rx1).await.unwrap();
    let second = engine.start(rx2).await;
    assert!(second.is_err(), "second start should fail: {second:?}");

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_engine_stop_idempotent() {
    let parts = test_helpers::engine_parts();
    let (engine, _events) = build_engine(&parts);
    let (_tx, rx) = mpsc::channel::<TransportEvent>(16);

    engine.start(rx).await.unwrap();
    engine.stop().await;
    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_recorded_through_pump() {
    let parts = test_helpers::engine_parts();
    let (engine, _events) = build_engine(&parts);
    let (tx, rx) = mpsc::channel::<TransportEvent>(16);
    engine.start(rx).await.unwrap();

    let device = DeviceId::new("esp32-a1");
    let reading = test_helpers::reading(&parts, "esp32-a1", SensorType::Ph, 6.1);
    tx.send(TransportEvent::SensorData(reading.clone()))
        .await
        .unwrap();
    tx.send(TransportEvent::Heartbeat {
        device_id: device.clone(),
        timestamp: parts.clock.now(),
    })
    .await
    .unwrap();

    // Yield so the pump processes both events
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    let latest = engine
        .latest_reading(&device, SensorType::Ph)
        .await
        .unwrap()
        .expect("reading should be stored");
    assert_eq!(latest.value, 6.1);

    use homegrowd::store::DeviceStore;
    assert_eq!(
        parts.devices.status(&device).await.unwrap(),
        Some(DeviceStatus::Online)
    );

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_sensor_trigger_through_facade() {
    let parts = test_helpers::engine_parts();
    let (engine, mut events) = build_engine(&parts);
    let (tx, rx) = mpsc::channel::<TransportEvent>(16);
    engine.start(rx).await.unwrap();

    let mut program = Program::new(
        "tds topup",
        DeviceId::new("esp32-a1"),
        Schedule::SensorTrigger,
        vec![Action::Notification {
            message: "topping up".to_string(),
            severity: Severity::Info,
        }],
    );
    program.conditions = vec![Condition::SensorThreshold {
        device_id: DeviceId::new("esp32-a1"),
        sensor_type: SensorType::Tds,
        operator: ComparisonOp::Lt,
        value: 800.0,
    }];
    engine.create_program(program).await.unwrap();

    let reading = test_helpers::reading(&parts, "esp32-a1", SensorType::Tds, 750.0);
    tx.send(TransportEvent::SensorData(reading)).await.unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        EngineEvent::ProgramStarted { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        EngineEvent::Notification { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        EngineEvent::ProgramCompleted { .. }
    ));

    engine.stop().await;
}

#[tokio::test]
async fn test_create_rule_validates() {
    let parts = test_helpers::engine_parts();
    let (engine, _events) = build_engine(&parts);

    let invalid = Rule::new("no conditions", vec![], vec![]);
    let result = engine.create_rule(invalid).await;
    assert!(matches!(result, Err(EngineError::Validation { .. })));

    let valid = notify_rule("esp32-a1");
    let id = engine.create_rule(valid).await.unwrap();
    use homegrowd::store::RuleStore;
    assert!(parts.rules.get(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_toggle_and_delete_rule() {
    let parts = test_helpers::engine_parts();
    let (engine, _events) = build_engine(&parts);

    let id = engine.create_rule(notify_rule("esp32-a1")).await.unwrap();
    engine.toggle_rule(&id, false).await.unwrap();

    use homegrowd::store::RuleStore;
    assert!(!parts.rules.get(&id).await.unwrap().unwrap().enabled);

    engine.delete_rule(&id).await.unwrap();
    assert!(parts.rules.get(&id).await.unwrap().is_none());

    let missing = engine.toggle_rule(&RuleId::new("ghost"), true).await;
    assert!(matches!(missing, Err(EngineError::NotFound { .. })));
}

#[tokio::test]
async fn test_duplicate_rule_rejected() {
    let parts = test_helpers::engine_parts();
    let (engine, _events) = build_engine(&parts);

    let rule = notify_rule("esp32-a1");
    engine.create_rule(rule.clone()).await.unwrap();
    let duplicate = engine.create_rule(rule).await;
    assert!(matches!(duplicate, Err(EngineError::Validation { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_manual_program_run_through_facade() {
    let parts = test_helpers::engine_parts();
    let (engine, mut events) = build_engine(&parts);

    let program = Program::new(
        "manual flush",
        DeviceId::new("esp32-a1"),
        Schedule::Manual,
        vec![Action::Notification {
            message: "flushing".to_string(),
            severity: Severity::Info,
        }],
    );
    let id = engine.create_program(program).await.unwrap();

    engine.run_program_manually(&id).await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        EngineEvent::ProgramStarted { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        EngineEvent::Notification { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        EngineEvent::ProgramCompleted { .. }
    ));

    use homegrowd::store::ProgramStore;
    let stored = parts.programs.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.stats.total_runs, 1);
}
