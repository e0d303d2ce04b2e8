use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use hardmon::core::telemetry::gpu::{PmLogData, PmLogSensor};
use hardmon::core::telemetry::ContextSettings;
use hardmon::HardmonError;

use super::fakes::{
    amd_adapter, cpu_context, gpu_context, seed_zen, zen_threads, FakeControlDriver,
    FakeControlLibrary, FakeProbe, FakeRegisterDriver, MSR_PKG_ENERGY_STAT, THM_TCON_CUR_TMP,
};

#[test]
fn test_degenerate_cycle_releases_session_before_next_poll() {
    let driver = Arc::new(FakeRegisterDriver::default());
    // No energy unit: temperature is the only primary reading
    driver.file.set_smn(THM_TCON_CUR_TMP, 600 << 21);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(zen_threads()));

    let first = context.cpu_snapshots().unwrap();
    assert_eq!(first[0].package_temperature_value(), Some(75.0));
    assert_eq!((driver.opens(), driver.closes()), (1, 0));

    // Driver loses the hardware: the cycle still reports, with nothing in it
    driver.file.kill(true);
    let second = context.cpu_snapshots().unwrap();
    assert_eq!(second[0].package_temperature_value(), None);
    assert_eq!(second[0].package_power_value(), None);
    assert_eq!(context.cpu_resets(), 1);
    assert_eq!(driver.closes(), 1);

    driver.file.kill(false);
    let third = context.cpu_snapshots().unwrap();
    assert_eq!(third[0].package_temperature_value(), Some(75.0));
    assert_eq!((driver.opens(), driver.closes()), (2, 1));
    assert_eq!(context.cpu_resets(), 1);
}

#[test]
fn test_lost_session_resets_after_power_was_reported() {
    let driver = Arc::new(FakeRegisterDriver::default());
    seed_zen(&driver.file);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(zen_threads()));

    context.cpu_snapshots().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    driver.file.set_msr(MSR_PKG_ENERGY_STAT, 65_536 * 4);
    let powered = context.cpu_snapshots().unwrap();
    assert!(powered[0].package_power_value().is_some_and(|p| p > 0.0));

    // Energy reads fail with everything else: power must not linger
    driver.file.kill(true);
    let dead = context.cpu_snapshots().unwrap();
    assert_eq!(dead[0].package_temperature_value(), None);
    assert_eq!(dead[0].package_power_value(), None);
    assert!(dead[0].core_powers.iter().all(|s| s.is_absent()));
    assert!(dead[0].cores_power.as_ref().is_some_and(|s| s.is_absent()));
    assert_eq!(context.cpu_resets(), 1);
    assert_eq!(driver.closes(), 1);

    driver.file.kill(false);
    let revived = context.cpu_snapshots().unwrap();
    assert_eq!(revived[0].package_temperature_value(), Some(75.0));
    assert_eq!((driver.opens(), driver.closes()), (2, 1));
    assert_eq!(context.cpu_resets(), 1);
}

#[test]
fn test_failed_open_is_retried_on_next_poll() {
    let driver = Arc::new(FakeRegisterDriver::default());
    driver.file.set_smn(THM_TCON_CUR_TMP, 600 << 21);
    driver.refuse.store(true, Ordering::SeqCst);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(zen_threads()));

    assert!(matches!(
        context.cpu_snapshots(),
        Err(HardmonError::DriverUnavailable(_))
    ));
    assert_eq!(context.cpu_resets(), 1);

    driver.refuse.store(false, Ordering::SeqCst);
    assert!(context.cpu_snapshots().is_ok());
    assert_eq!(driver.opens(), 1);
}

#[test]
fn test_explicit_reset_drops_session() {
    let driver = Arc::new(FakeRegisterDriver::default());
    driver.file.set_smn(THM_TCON_CUR_TMP, 600 << 21);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(zen_threads()));

    context.cpu_snapshots().unwrap();
    context.reset_cpu();
    assert_eq!(driver.closes(), 1);
    // Manual resets are not watchdog decisions
    assert_eq!(context.cpu_resets(), 0);

    context.cpu_snapshots().unwrap();
    assert_eq!(driver.opens(), 2);
}

#[test]
fn test_degenerate_gpu_reopens_control_library() {
    let library = FakeControlLibrary {
        context: true,
        overdrive_version: Some(8),
        adapters: vec![amd_adapter(0)],
        ..Default::default()
    };
    *library.pm_log.lock() = Some(PmLogData::default().with(PmLogSensor::TemperatureEdge, 52));
    let control = Arc::new(FakeControlDriver::new(library));
    let context = gpu_context(ContextSettings::default()).with_control_library(control.clone());

    let first = context.gpu_snapshot().unwrap();
    assert_eq!(first.core_temperature(), Some(52.0));

    // Bulk log now reports only a clock: no temperature, no power
    *control.library.pm_log.lock() = Some(PmLogData::default().with(PmLogSensor::ClockGfx, 2_100));
    let second = context.gpu_snapshot().unwrap();
    assert_eq!(second.core_temperature(), None);
    assert_eq!(context.gpu_resets(), 1);
    assert_eq!(control.opens(), 1);

    *control.library.pm_log.lock() = Some(PmLogData::default().with(PmLogSensor::TemperatureEdge, 53));
    let third = context.gpu_snapshot().unwrap();
    assert_eq!(third.core_temperature(), Some(53.0));
    assert_eq!(control.opens(), 2);
}
