//! Lifecycle controller: enable / detect / disable and worker exit handling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use expansion::adapters::nvs::NvsAdapter;
use expansion::app::events::ExpansionEvent;
use expansion::app::ports::{SettingsPort, UartId};
use expansion::config::{ExpansionSettings, LinkConfig};
use expansion::error::SettingsError;
use expansion::session::worker::ExitReason;
use expansion::{Error, Expansion, ServiceState};

use super::mock_hw::{
    MockDetect, MockRpc, MockSerial, RecordingSink, SerialOp, test_config, wait_until,
};

const UART1: UartId = UartId(1);
const UART2: UartId = UartId(2);
const WAIT: Duration = Duration::from_secs(2);

type Service = Expansion<MockSerial, MockDetect, MockRpc>;

struct Rig {
    service: Service,
    serial: MockSerial,
    detect: MockDetect,
    sink: RecordingSink,
}

fn rig_with(serial: MockSerial, inactivity_timeout_ms: u32) -> Rig {
    rig_with_config(serial, test_config(inactivity_timeout_ms))
}

fn rig_with_config(serial: MockSerial, config: LinkConfig) -> Rig {
    let detect = MockDetect::new();
    let sink = RecordingSink::new();
    let service = Expansion::new(
        serial.clone(),
        detect.clone(),
        Arc::new(MockRpc::echo()),
        config,
        Box::new(sink.clone()),
    );
    Rig {
        service,
        serial,
        detect,
        sink,
    }
}

fn rig(inactivity_timeout_ms: u32) -> Rig {
    rig_with(MockSerial::new(), inactivity_timeout_ms)
}

fn bind_count(serial: &MockSerial) -> usize {
    serial
        .ops()
        .iter()
        .filter(|op| matches!(op, SerialOp::Bind { .. }))
        .count()
}

fn closed_reasons(sink: &RecordingSink) -> Vec<ExitReason> {
    sink.events()
        .iter()
        .filter_map(|e| match e {
            ExpansionEvent::ConnectionClosed { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

#[test]
fn starts_disabled_with_nothing_armed() {
    let r = rig(1000);
    assert_eq!(r.service.state(), ServiceState::Disabled);
    assert_eq!(r.service.uart(), None);
    assert_eq!(r.detect.armed_on(), None);
    assert!(r.sink.events().is_empty());
}

#[test]
fn enable_arms_detection() {
    let r = rig(1000);
    r.service.enable(UART1);

    assert_eq!(r.service.state(), ServiceState::Enabled);
    assert_eq!(r.service.uart(), Some(UART1));
    assert_eq!(r.detect.armed_on(), Some(UART1));
    assert!(!r.serial.is_bound(), "no UART binding before detection");
    assert_eq!(
        r.sink.events(),
        vec![ExpansionEvent::StateChanged {
            from: ServiceState::Disabled,
            to: ServiceState::Enabled,
        }]
    );
}

#[test]
fn detect_starts_a_single_worker() {
    let r = rig(5000);
    r.service.enable(UART1);
    assert!(r.detect.fire());

    assert_eq!(r.service.state(), ServiceState::Running);
    assert!(wait_until(WAIT, || r.serial.has_hook()));
    assert_eq!(
        r.serial.ops()[0],
        SerialOp::Bind {
            uart: UART1,
            baud: 9600
        }
    );
    assert_eq!(r.detect.armed_on(), None, "worker disarms detection");

    // A second detection while running changes nothing.
    r.service.on_detect();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(r.service.state(), ServiceState::Running);
    assert_eq!(bind_count(&r.serial), 1);

    r.service.disable();
}

#[test]
fn detect_is_ignored_when_disabled() {
    let r = rig(1000);
    r.service.on_detect();
    assert_eq!(r.service.state(), ServiceState::Disabled);
    assert!(r.serial.ops().is_empty());
}

#[test]
fn disable_stops_running_worker_promptly() {
    let r = rig(5000);
    r.service.enable(UART1);
    r.detect.fire();
    assert!(wait_until(WAIT, || r.serial.has_hook()));

    let started = Instant::now();
    r.service.disable();
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "disable must not wait for the inactivity window"
    );

    assert_eq!(r.service.state(), ServiceState::Disabled);
    assert!(!r.serial.is_bound());
    assert!(!r.serial.has_hook());
    assert_eq!(r.serial.ops().last(), Some(&SerialOp::Unbind));
    assert_eq!(r.detect.armed_on(), None);
    assert_eq!(closed_reasons(&r.sink), vec![ExitReason::User]);
}

#[test]
fn disable_when_disabled_is_a_no_op() {
    let r = rig(1000);
    r.service.disable();
    assert_eq!(r.service.state(), ServiceState::Disabled);
    assert!(r.sink.events().is_empty());
}

#[test]
fn disable_from_enabled_disarms() {
    let r = rig(1000);
    r.service.enable(UART1);
    r.service.disable();
    assert_eq!(r.service.state(), ServiceState::Disabled);
    assert_eq!(r.detect.armed_on(), None);
}

#[test]
fn inactivity_timeout_returns_to_enabled() {
    let r = rig(50);
    r.service.enable(UART1);
    r.detect.fire();

    assert!(wait_until(WAIT, || {
        r.service.state() == ServiceState::Enabled && r.detect.armed_on() == Some(UART1)
    }));
    assert!(!r.serial.is_bound());
    assert_eq!(closed_reasons(&r.sink), vec![ExitReason::Timeout]);
    assert_eq!(r.detect.arm_count(), 2);

    // The service is ready for the next accessory.
    r.detect.fire();
    assert!(wait_until(WAIT, || bind_count(&r.serial) == 2));
    r.service.disable();
    assert_eq!(r.service.state(), ServiceState::Disabled);
}

#[test]
fn bind_failure_disables_the_service() {
    let r = rig_with(MockSerial::failing(), 1000);
    r.service.enable(UART1);
    r.detect.fire();

    assert!(wait_until(WAIT, || r.service.state() == ServiceState::Disabled));
    assert_eq!(closed_reasons(&r.sink), vec![ExitReason::Error]);
    assert_eq!(r.detect.armed_on(), None);
}

#[test]
fn worker_spawn_failure_keeps_listening() {
    // No host can map a stack this large, so the worker thread never starts.
    let config = LinkConfig {
        worker_stack_kb: 1 << 44,
        ..test_config(1000)
    };
    let r = rig_with_config(MockSerial::new(), config);
    r.service.enable(UART1);
    assert!(r.detect.fire());

    assert_eq!(r.service.state(), ServiceState::Enabled);
    assert_eq!(r.detect.armed_on(), Some(UART1));
    assert_eq!(r.detect.arm_count(), 2);
    assert_eq!(bind_count(&r.serial), 0);
    assert!(!r
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, ExpansionEvent::ConnectionStarted { .. })));

    r.service.disable();
    assert_eq!(r.detect.armed_on(), None);
}

#[test]
fn enable_while_running_restarts_on_new_uart() {
    let r = rig(5000);
    r.service.enable(UART1);
    r.detect.fire();
    assert!(wait_until(WAIT, || r.serial.has_hook()));

    r.service.enable(UART2);
    assert_eq!(r.service.state(), ServiceState::Enabled);
    assert_eq!(r.service.uart(), Some(UART2));
    assert_eq!(r.detect.armed_on(), Some(UART2));
    assert!(!r.serial.is_bound());

    r.service.disable();
}

#[test]
fn state_changes_are_reported_in_order() {
    let r = rig(5000);
    r.service.enable(UART1);
    r.detect.fire();
    assert!(wait_until(WAIT, || r.serial.has_hook()));
    r.service.disable();

    let states: Vec<(ServiceState, ServiceState)> = r
        .sink
        .events()
        .iter()
        .filter_map(|e| match e {
            ExpansionEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            (ServiceState::Disabled, ServiceState::Enabled),
            (ServiceState::Enabled, ServiceState::Running),
            (ServiceState::Running, ServiceState::Disabled),
        ]
    );
    assert!(r
        .sink
        .events()
        .contains(&ExpansionEvent::ConnectionStarted { uart: UART1 }));
}

// ── Boot sequence ─────────────────────────────────────────────

#[test]
fn first_boot_writes_default_settings() {
    let r = rig(1000);
    let mut nvs = NvsAdapter::new().unwrap();

    r.service.on_system_start(&mut nvs).unwrap();

    assert_eq!(r.service.state(), ServiceState::Disabled);
    assert_eq!(nvs.load(), Ok(ExpansionSettings::default()));
}

#[test]
fn boot_enables_persisted_uart() {
    let r = rig(1000);
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.save(&ExpansionSettings::with_uart(Some(UART1))).unwrap();

    r.service.on_system_start(&mut nvs).unwrap();

    assert_eq!(r.service.state(), ServiceState::Enabled);
    assert_eq!(r.detect.armed_on(), Some(UART1));
}

#[test]
fn corrupted_settings_are_replaced() {
    let r = rig(1000);
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write_raw(&[0xEE, 0x01]);

    r.service.on_system_start(&mut nvs).unwrap();

    assert_eq!(r.service.state(), ServiceState::Disabled);
    assert_eq!(nvs.load(), Ok(ExpansionSettings::default()));
}

struct BrokenStore;

impl SettingsPort for BrokenStore {
    fn load(&self) -> Result<ExpansionSettings, SettingsError> {
        Err(SettingsError::IoError)
    }

    fn save(&mut self, _settings: &ExpansionSettings) -> Result<(), SettingsError> {
        Err(SettingsError::IoError)
    }
}

#[test]
fn unreadable_settings_are_reported() {
    let r = rig(1000);
    assert_eq!(
        r.service.on_system_start(&mut BrokenStore),
        Err(Error::Settings(SettingsError::IoError))
    );
    assert_eq!(r.service.state(), ServiceState::Disabled);
    assert_eq!(r.detect.armed_on(), None);
}
