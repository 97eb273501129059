// Many callers racing on the same code must produce exactly one latch move.

use std::sync::{Arc, Barrier};
use std::thread;

use intercom_unlock::actuator::{ServoAngle, SimulatedActuator};
use intercom_unlock::clock::SystemClock;
use intercom_unlock::credentials::{CodeFormat, CredentialAuthority, CredentialConfig};
use intercom_unlock::error::{CredentialError, UnlockError};
use intercom_unlock::telemetry::{MetricEvent, TelemetryCollector};
use intercom_unlock::unlock::UnlockGate;

const CALLERS: usize = 16;

type Rig = (
    Arc<UnlockGate>,
    Arc<CredentialAuthority>,
    Arc<SimulatedActuator>,
    Arc<TelemetryCollector>,
);

fn gate(config: CredentialConfig) -> Rig {
    let clock = Arc::new(SystemClock::default());
    let authority = Arc::new(CredentialAuthority::new(config, clock.clone()));
    let actuator = Arc::new(SimulatedActuator::new());
    let telemetry = Arc::new(TelemetryCollector::new(64, 128));
    let gate = Arc::new(UnlockGate::new(
        authority.clone(),
        actuator.clone(),
        ServoAngle::new(75).unwrap(),
        clock,
        telemetry.clone(),
    ));
    (gate, authority, actuator, telemetry)
}

#[test]
fn racing_callers_move_the_latch_once() {
    let (gate, authority, actuator, telemetry) = gate(CredentialConfig::default());
    let code = authority.issue().code;
    let barrier = Arc::new(Barrier::new(CALLERS));

    let results: Vec<Result<_, UnlockError>> = (0..CALLERS)
        .map(|_| {
            let gate = gate.clone();
            let barrier = barrier.clone();
            let code = code.clone();
            thread::spawn(move || {
                barrier.wait();
                gate.authorize(&code)
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().expect("caller thread"))
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == UnlockError::Credential(CredentialError::AlreadyConsumed)));

    assert_eq!(actuator.moves(), vec![ServoAngle::new(75).unwrap()]);

    let snapshot = telemetry.snapshot();
    let rejected = snapshot
        .recent
        .iter()
        .filter(|e| matches!(e, MetricEvent::CredentialRejected { .. }))
        .count();
    assert_eq!(rejected, CALLERS - 1);
}

#[test]
fn distinct_codes_unlock_independently() {
    let config = CredentialConfig {
        code_format: CodeFormat::Token,
        ..CredentialConfig::default()
    };
    let (gate, authority, actuator, _) = gate(config);
    let codes: Vec<String> = (0..4).map(|_| authority.issue().code).collect();

    thread::scope(|scope| {
        for code in &codes {
            let gate = &gate;
            scope.spawn(move || gate.authorize(code).expect("fresh code"));
        }
    });

    assert_eq!(actuator.moves().len(), 4);
    assert_eq!(authority.active_count(), 0);
}
