//! End-to-end runs of the remap manager against the mock driver

use std::sync::Arc;
use vjoy_remap::device::{ConfigurationError, MockDeviceSource};
use vjoy_remap::driver::mock_driver::{DriverCall, MockDriver, MockSlot};
use vjoy_remap::driver::DriverError;
use vjoy_remap::mapping::config::{ButtonBinding, Config, HatBinding};
use vjoy_remap::manager::EVENT_QUEUE_SIZE;
use vjoy_remap::{HatDirection, InputEvent, ManagerError, RemapManager};

const CONFIG: &str = r#"
[settings]
keep_alive_secs = 60

[[axes]]
device = "Stick"
input = 1
slot = 1
output = 1
calibration = { minimum = 0, center = 512, maximum = 1024 }

[[buttons]]
device = "Stick"
input = 1
slot = 1
output = 3

[[hats]]
device = "Stick"
input = 1
slot = 1
output = 1
"#;

fn setup() -> (Arc<MockDriver>, MockDeviceSource) {
    let _ = env_logger::builder().is_test(true).try_init();
    let driver = Arc::new(MockDriver::new().with_slot(1, MockSlot::new(4, 8, 1)));
    let source = MockDeviceSource::new()
        .with_physical(0x044F, 0xB10A, "Stick", 4, 16, 1)
        .with_virtual(4, 8, 1);
    (driver, source)
}

#[test]
fn test_events_reach_virtual_device() {
    let (driver, source) = setup();
    let config = Config::from_toml(CONFIG).unwrap();
    let mut manager = RemapManager::new(config, driver.clone(), Box::new(source)).unwrap();

    manager.start().unwrap();
    assert!(manager.is_running());
    assert!(driver.is_owned(1));
    let bound = manager.enumeration().unwrap().virtual_devices().next().unwrap().vjoy_id();
    assert_eq!(bound, Some(1));

    manager
        .send_event(InputEvent::AxisMoved { device: "Stick".into(), axis: 1, raw: 1024.0 })
        .unwrap();
    manager
        .send_event(InputEvent::ButtonChanged { device: "Stick".into(), button: 1, pressed: true })
        .unwrap();
    manager
        .send_event(InputEvent::HatChanged {
            device: "Stick".into(),
            hat: 1,
            direction: HatDirection::EAST,
        })
        .unwrap();

    // Stop drains the queue before releasing the devices
    manager.stop();
    assert!(!manager.is_running());

    let calls = driver.calls();
    assert!(calls.contains(&DriverCall::SetAxis { slot: 1, axis: 0x30, value: 32768 }));
    assert!(calls.contains(&DriverCall::SetButton { slot: 1, button: 3, pressed: true }));
    assert!(calls.contains(&DriverCall::SetHatContinuous { slot: 1, hat: 1, angle: 9000 }));
    assert!(!driver.is_owned(1));
    // One release for the matching scan, one at shutdown
    assert_eq!(driver.release_count(1), 2);
}

#[test]
fn test_no_events_lost_when_queue_fills() {
    let (driver, source) = setup();
    let config = Config::from_toml(CONFIG).unwrap();
    let mut manager = RemapManager::new(config, driver.clone(), Box::new(source)).unwrap();
    manager.start().unwrap();

    let total = EVENT_QUEUE_SIZE * 2 + 7;
    for i in 0..total {
        let event = InputEvent::ButtonChanged {
            device: "Stick".into(),
            button: 1,
            pressed: i % 2 == 0,
        };
        manager.send_event(event).unwrap();
    }
    manager.stop();

    let writes =
        driver.count_calls(|c| matches!(c, DriverCall::SetButton { slot: 1, button: 3, .. }));
    assert_eq!(writes, total);
}

#[test]
fn test_events_refused_while_stopped() {
    let (driver, source) = setup();
    let config = Config::from_toml(CONFIG).unwrap();
    let mut manager = RemapManager::new(config, driver.clone(), Box::new(source)).unwrap();

    let event = InputEvent::ButtonChanged { device: "Stick".into(), button: 1, pressed: true };
    assert!(matches!(manager.send_event(event.clone()), Err(ManagerError::NotRunning)));
    assert!(manager.event_sender().is_none());

    manager.start().unwrap();
    let sender = manager.event_sender().unwrap();
    manager.stop();

    assert!(matches!(manager.send_event(event.clone()), Err(ManagerError::NotRunning)));
    // The executor thread is gone, so stale senders fail too
    assert!(sender.send(event).is_err());
    assert_eq!(driver.count_calls(|c| matches!(c, DriverCall::SetButton { pressed: true, .. })), 0);
}

#[test]
fn test_start_twice_fails() {
    let (driver, source) = setup();
    let config = Config::from_toml(CONFIG).unwrap();
    let mut manager = RemapManager::new(config, driver, Box::new(source)).unwrap();

    manager.start().unwrap();
    assert!(matches!(manager.start(), Err(ManagerError::AlreadyRunning)));
}

#[test]
fn test_drop_releases_devices() {
    let (driver, source) = setup();
    let config = Config::from_toml(CONFIG).unwrap();
    {
        let mut manager = RemapManager::new(config, driver.clone(), Box::new(source)).unwrap();
        manager.start().unwrap();
    }
    assert!(!driver.is_owned(1));
}

#[test]
fn test_driver_not_running() {
    let (driver, source) = setup();
    driver.set_running(false);

    let result = RemapManager::new(Config::default(), driver, Box::new(source));
    assert!(matches!(result, Err(ManagerError::Driver(DriverError::NotRunning))));
}

#[test]
fn test_ambiguous_devices_hold_no_slot() {
    let (driver, _) = setup();
    driver.add_slot(2, MockSlot::new(4, 8, 1));
    let source = MockDeviceSource::new().with_virtual(4, 8, 1).with_virtual(4, 8, 1);
    let config = Config::from_toml(CONFIG).unwrap();

    let mut manager = RemapManager::new(config, driver.clone(), Box::new(source)).unwrap();
    let err = manager.start().unwrap_err();

    assert!(matches!(
        err,
        ManagerError::Configuration(ConfigurationError::IndistinguishableDevices { .. })
    ));
    assert!(!manager.is_running());
    assert!(!driver.is_owned(1));
    assert!(!driver.is_owned(2));
}

#[test]
fn test_busy_slot_fails_start() {
    let (driver, source) = setup();
    let mut config = Config::from_toml(CONFIG).unwrap();
    driver.add_slot(2, MockSlot::new(2, 2, 1));
    driver.mark_busy(2);
    config.buttons.push(ButtonBinding { device: "Stick".into(), input: 2, slot: 2, output: 1 });
    config.hats.push(HatBinding { device: "Stick".into(), input: 2, slot: 2, output: 1 });

    let mut manager = RemapManager::new(config, driver.clone(), Box::new(source)).unwrap();
    let err = manager.start().unwrap_err();

    assert!(matches!(err, ManagerError::Driver(DriverError::SlotUnavailable { slot: 2, .. })));
    // Slot 1 was acquired first and released again
    assert!(!driver.is_owned(1));
}
