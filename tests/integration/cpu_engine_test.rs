use std::sync::Arc;
use std::time::Duration;

use hardmon::core::telemetry::{LogicalProcessor, PciAddress, Vendor};
use hardmon::HardmonError;

use super::fakes::{
    close, cpu_context, seed_zen, thread, zen_threads, FakeProbe, FakeRegisterDriver,
    CCD_TEMP_BASE, MSR_COFVID_STATUS, MSR_CORE_ENERGY_STAT, MSR_HW_P_STATE_STATUS,
    MSR_PKG_ENERGY_STAT, MSR_P_STATE_0, REPORTED_TEMPERATURE_CONTROL, THERMTRIP_STATUS,
};

/// Single package, one thread per core.
fn family_threads(count: u8, family: u32, model: u32) -> Vec<LogicalProcessor> {
    (0..count)
        .map(|i| thread(i, 0, i as u32, Vendor::Amd, family, model))
        .collect()
}

#[test]
fn test_zen_package_readings() {
    let driver = Arc::new(FakeRegisterDriver::default());
    seed_zen(&driver.file);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(zen_threads()));

    let snapshots = context.cpu_snapshots().unwrap();
    assert_eq!(snapshots.len(), 1);
    let cpu = &snapshots[0];

    assert_eq!(cpu.family, "Zen");
    assert_eq!(cpu.package_temperature_value(), Some(75.0));
    // No Tctl offset for this brand, so no separate control sensor
    assert!(cpu.control_temperature.is_none());
    assert_eq!(cpu.ccd_temperatures.len(), 4);
    assert_eq!(cpu.ccd_temperatures[0].value(), Some(45.0));
    assert!(cpu.ccd_temperatures[1].is_absent());
    // Aggregates need more than one valid CCD
    assert_eq!(cpu.ccd_max_temperature.as_ref().and_then(|s| s.value()), None);

    let bus = cpu.bus_clock.as_ref().and_then(|s| s.value()).unwrap();
    assert!((bus - 100.0).abs() < 1e-3);
    assert_eq!(cpu.core_clocks.len(), 2);
    assert!((cpu.core_clocks[0].value().unwrap() - 3400.0).abs() < 1e-2);
}

#[test]
fn test_zen_power_from_energy_counter() {
    let driver = Arc::new(FakeRegisterDriver::default());
    seed_zen(&driver.file);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(zen_threads()));

    // Counter has not moved yet
    let first = context.cpu_snapshots().unwrap();
    assert_eq!(first[0].package_power_value().unwrap_or(0.0), 0.0);

    std::thread::sleep(Duration::from_millis(50));
    driver.file.set_msr(MSR_PKG_ENERGY_STAT, 65_536 * 4);

    let second = context.cpu_snapshots().unwrap();
    let power = second[0].package_power_value().unwrap();
    assert!(power > 0.0);
    // 4 J over at least 50 ms
    assert!(power <= 80.0);
}

#[test]
fn test_unsupported_vendor_is_sticky() {
    let driver = Arc::new(FakeRegisterDriver::default());
    let threads = vec![thread(0, 0, 0, Vendor::Intel, 6, 0x97)];
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(threads));

    for _ in 0..3 {
        match context.cpu_snapshots() {
            Err(HardmonError::UnsupportedVendor { vendor }) => assert_eq!(vendor, "Intel"),
            other => panic!("expected UnsupportedVendor, got {:?}", other.map(|s| s.len())),
        }
    }

    // Construction is never retried and the watchdog stays quiet
    assert_eq!(driver.opens(), 1);
    assert_eq!(context.cpu_resets(), 0);
}

#[test]
fn test_unknown_amd_family_uses_generic_strategy() {
    let driver = Arc::new(FakeRegisterDriver::default());
    let threads = vec![thread(0, 0, 0, Vendor::Amd, 0x1A, 0x44)];
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(threads));

    let snapshots = context.cpu_snapshots().unwrap();
    assert_eq!(snapshots[0].family, "Generic");
    assert!(snapshots[0].package_temperature.is_none());

    // Generic packages have nothing to lose, so no reset either
    context.cpu_snapshots().unwrap();
    assert_eq!(context.cpu_resets(), 0);
    assert_eq!(driver.opens(), 1);
}

#[test]
fn test_empty_topology_is_an_error() {
    let driver = Arc::new(FakeRegisterDriver::default());
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(Vec::new()));

    assert!(matches!(context.cpu_snapshots(), Err(HardmonError::NoProcessors)));
}

#[test]
fn test_zen_ccd_aggregates_over_valid_chiplets() {
    let driver = Arc::new(FakeRegisterDriver::default());
    seed_zen(&driver.file);
    // Second chiplet at 98 / 8 - 49 = 49 °C
    driver.file.set_smn(CCD_TEMP_BASE + 4, 0x800 | 0x310);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(zen_threads()));

    let cpu = &context.cpu_snapshots().unwrap()[0];

    assert_eq!(cpu.ccd_temperatures[0].value(), Some(45.0));
    assert_eq!(cpu.ccd_temperatures[1].value(), Some(49.0));
    assert!(cpu.ccd_temperatures[2].is_absent());
    assert_eq!(cpu.ccd_max_temperature.as_ref().and_then(|s| s.value()), Some(49.0));
    assert_eq!(cpu.ccd_avg_temperature.as_ref().and_then(|s| s.value()), Some(47.0));
}

#[test]
fn test_zen_tctl_offset_brand_reports_control_and_die() {
    let driver = Arc::new(FakeRegisterDriver::default());
    seed_zen(&driver.file);
    let threads = zen_threads()
        .into_iter()
        .map(|mut t| {
            t.family = 0x17;
            t.model = 0x01;
            t.brand = "AMD Ryzen 7 1800X Eight-Core Processor".to_string();
            t
        })
        .collect();
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(threads));

    let cpu = &context.cpu_snapshots().unwrap()[0];

    assert_eq!(cpu.control_temperature.as_ref().and_then(|s| s.value()), Some(75.0));
    assert_eq!(cpu.package_temperature_value(), Some(55.0));
}

#[test]
fn test_zen_core_registers_read_on_their_own_core() {
    let driver = Arc::new(FakeRegisterDriver::default());
    seed_zen(&driver.file);
    // Core #2 (first thread is processor 2) runs at 36x with its own counter
    driver.file.set_cpu_msr(2, MSR_HW_P_STATE_STATUS, 0x0890);
    driver.file.set_cpu_msr(2, MSR_CORE_ENERGY_STAT, 0);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(zen_threads()));

    let first = context.cpu_snapshots().unwrap();
    assert!(close(first[0].core_clocks[0].value(), 3400.0));
    assert!(close(first[0].core_clocks[1].value(), 3600.0));

    std::thread::sleep(Duration::from_millis(50));
    driver.file.set_cpu_msr(2, MSR_CORE_ENERGY_STAT, 65_536 * 2);

    let second = context.cpu_snapshots().unwrap();
    let cpu = &second[0];
    assert_eq!(cpu.core_powers[0].value(), Some(0.0));
    let core2 = cpu.core_powers[1].value().unwrap();
    // 2 J over at least 50 ms
    assert!(core2 > 0.0 && core2 <= 40.0);
    // Package counter is read on processor 0 and did not move
    assert_eq!(cpu.package_power_value(), Some(0.0));
}

#[test]
fn test_k10_temperature_from_northbridge() {
    let driver = Arc::new(FakeRegisterDriver::default());
    let misc_control = PciAddress::new(0, 0x18, 3);
    driver.file.set_pci(misc_control, REPORTED_TEMPERATURE_CONTROL, 0, 400 << 21);
    // P0 at 34x puts the bus at 100 MHz; the core runs at 30x
    driver.file.set_msr(MSR_P_STATE_0, 0x12);
    driver.file.set_msr(MSR_COFVID_STATUS, 0x0E);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(family_threads(2, 0x10, 0x02)));

    let cpu = &context.cpu_snapshots().unwrap()[0];

    assert_eq!(cpu.family, "K10");
    assert_eq!(cpu.package_temperature_value(), Some(50.0));
    assert!(close(cpu.bus_clock.as_ref().and_then(|s| s.value()), 100.0));
    assert!(close(cpu.core_clocks[0].value(), 3000.0));
}

#[test]
fn test_k8_selects_each_core_and_averages() {
    let driver = Arc::new(FakeRegisterDriver::default());
    let misc_control = PciAddress::new(0, 0x18, 3);
    driver.file.set_pci(misc_control, THERMTRIP_STATUS, 0x4, 100 << 16);
    driver.file.set_pci(misc_control, THERMTRIP_STATUS, 0x0, 90 << 16);
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(family_threads(2, 0x0F, 0x2B)));

    let cpu = &context.cpu_snapshots().unwrap()[0];

    assert_eq!(cpu.family, "K8");
    assert_eq!(
        *driver.file.pci_writes.lock(),
        vec![
            (misc_control, THERMTRIP_STATUS, 0x4),
            (misc_control, THERMTRIP_STATUS, 0x0),
        ]
    );
    let cores: Vec<Option<f32>> = cpu.core_temperatures.iter().map(|s| s.value()).collect();
    assert_eq!(cores, vec![Some(51.0), Some(41.0)]);
    assert_eq!(cpu.package_temperature_value(), Some(46.0));
}

#[test]
fn test_packages_past_last_northbridge_fall_back_to_generic() {
    let driver = Arc::new(FakeRegisterDriver::default());
    for device in 0x18..=0x1F {
        driver
            .file
            .set_pci(PciAddress::new(0, device, 3), REPORTED_TEMPERATURE_CONTROL, 0, 400 << 21);
    }
    let threads = (0..9)
        .map(|i| thread(i, i as u32, 0, Vendor::Amd, 0x10, 0x02))
        .collect();
    let context = cpu_context(Arc::clone(&driver), FakeProbe::new(threads));

    let snapshots = context.cpu_snapshots().unwrap();

    assert_eq!(snapshots.len(), 9);
    assert!(snapshots[..8]
        .iter()
        .all(|s| s.family == "K10" && s.package_temperature_value() == Some(50.0)));
    assert_eq!(snapshots[8].family, "Generic");
    assert_eq!(context.cpu_resets(), 0);
}
