//! Virtual device lifecycle and keep-alive behavior

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use vjoy_remap::driver::mock_driver::{MockDriver, MockSlot};
use vjoy_remap::driver::{DriverError, DriverHandle, DriverVersion, REQUIRED_DRIVER_VERSION};
use vjoy_remap::transform::{CurveKind, ResponseCurve};
use vjoy_remap::vjoy::{AcquisitionState, AxisName, VirtualDevice};

fn setup(layout: MockSlot) -> (Arc<MockDriver>, DriverHandle) {
    let driver = Arc::new(MockDriver::new().with_slot(1, layout));
    let handle = DriverHandle::open(driver.clone(), REQUIRED_DRIVER_VERSION).unwrap();
    (driver, handle)
}

#[test]
fn test_driver_checks_happen_once_at_open() {
    let driver = Arc::new(MockDriver::new());
    driver.set_running(false);
    assert_eq!(
        DriverHandle::open(driver.clone(), REQUIRED_DRIVER_VERSION).unwrap_err(),
        DriverError::NotRunning
    );

    driver.set_running(true);
    driver.set_version(DriverVersion(0x216));
    assert!(matches!(
        DriverHandle::open(driver, REQUIRED_DRIVER_VERSION),
        Err(DriverError::VersionMismatch { .. })
    ));
}

#[test]
fn test_reset_centers_every_axis() {
    let (driver, handle) = setup(MockSlot::new(8, 8, 1));
    let mut device = VirtualDevice::acquire(&handle, 1).unwrap();

    let inverted =
        ResponseCurve::from_points(CurveKind::CubicSpline, &[(-1.0, 1.0), (1.0, -1.0)]).unwrap();
    for name in AxisName::ALL {
        let axis = device.axis_by_name_mut(name).unwrap();
        axis.set_response_curve(inverted.clone());
        axis.set_value(-0.7).unwrap();
    }

    device.reset().unwrap();

    for axis in device.axes() {
        assert_eq!(axis.value(), 0.0, "axis {}", axis.name());
    }
    // Rotational axes included, even though the driver's own reset puts them at 0
    assert_eq!(driver.axis_value(1, AxisName::RX.usage_id()), Some(16384));
    assert_eq!(driver.axis_value(1, AxisName::SL1.usage_id()), Some(16384));
}

#[test]
fn test_double_invalidate_releases_once() {
    let (driver, handle) = setup(MockSlot::new(4, 8, 1));
    let mut device = VirtualDevice::acquire(&handle, 1).unwrap();

    assert!(device.invalidate().is_ok());
    assert!(device.invalidate().is_ok());
    assert_eq!(device.state(), AcquisitionState::Released);
    assert_eq!(driver.release_count(1), 1);

    // The slot can be acquired again afterwards
    let again = VirtualDevice::acquire(&handle, 1).unwrap();
    assert_eq!(again.state(), AcquisitionState::Acquired);
}

#[test]
fn test_idle_device_gets_keep_alive_reset() {
    let (driver, handle) = setup(MockSlot::new(2, 2, 0));
    let device =
        VirtualDevice::acquire_with_keep_alive(&handle, 1, Duration::from_millis(40)).unwrap();
    let after_acquire = driver.reset_count(1);

    thread::sleep(Duration::from_millis(300));

    assert!(driver.reset_count(1) > after_acquire);
    drop(device);
}

#[test]
fn test_used_device_gets_no_keep_alive_reset() {
    let (driver, handle) = setup(MockSlot::new(2, 2, 0));
    let mut device =
        VirtualDevice::acquire_with_keep_alive(&handle, 1, Duration::from_millis(150)).unwrap();
    let after_acquire = driver.reset_count(1);

    let started = Instant::now();
    let mut pressed = false;
    while started.elapsed() < Duration::from_millis(400) {
        pressed = !pressed;
        device.button_mut(1).unwrap().set_pressed(pressed).unwrap();
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(driver.reset_count(1), after_acquire);
}

#[test]
fn test_invalidate_stops_keep_alive() {
    let (driver, handle) = setup(MockSlot::new(2, 2, 0));
    let mut device =
        VirtualDevice::acquire_with_keep_alive(&handle, 1, Duration::from_millis(20)).unwrap();

    device.invalidate().unwrap();
    let after_invalidate = driver.reset_count(1);

    thread::sleep(Duration::from_millis(150));
    assert_eq!(driver.reset_count(1), after_invalidate);
}
