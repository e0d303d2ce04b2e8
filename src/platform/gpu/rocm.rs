use std::sync::Arc;

use crate::core::telemetry::gpu::{
    DeviceMetrics, MetricsSession, MetricsSessionDriver, SessionAdapter, AMD_VENDOR_ID,
};
use crate::error::{HardmonError, Result};

#[cfg(all(unix, feature = "rocm"))]
use rocm_smi_lib::{RocmSmi, TemperatureMetric};

/// Metrics session backed by ROCm SMI
pub struct RocmSession {
    #[cfg(all(unix, feature = "rocm"))]
    rocm: parking_lot::Mutex<RocmSmi>,
    device_count: u32,
}

impl MetricsSession for RocmSession {
    fn adapters(&self) -> Result<Vec<SessionAdapter>> {
        #[cfg(all(unix, feature = "rocm"))]
        {
            let rocm = self.rocm.lock();
            (0..self.device_count)
                .map(|index| {
                    let device = rocm
                        .get_device_handle(index)
                        .map_err(|e| HardmonError::gpu_not_available(format!("{:?}", e)))?;
                    let name = rocm
                        .get_device_name(&device)
                        .unwrap_or_else(|_| "Unknown AMD GPU".to_string());
                    Ok(SessionAdapter {
                        name,
                        vendor_id: AMD_VENDOR_ID,
                        bus_id: index,
                        handle: index as usize,
                    })
                })
                .collect()
        }
        #[cfg(not(all(unix, feature = "rocm")))]
        {
            let _ = (self.device_count, AMD_VENDOR_ID);
            Err(HardmonError::gpu_not_available("ROCm support not enabled"))
        }
    }

    fn current_metrics(&self, adapter: &SessionAdapter) -> Result<DeviceMetrics> {
        #[cfg(all(unix, feature = "rocm"))]
        {
            let rocm = self.rocm.lock();
            let device = rocm
                .get_device_handle(adapter.handle as u32)
                .map_err(|_| HardmonError::adapter_not_found(adapter.name.as_str()))?;

            // Edge temperature in millidegrees, power in microwatts
            let temperature = rocm
                .get_temperature(&device, TemperatureMetric::Edge)
                .map_err(|e| HardmonError::gpu_not_available(format!("{:?}", e)))?;
            let board_power = rocm.get_power_average(&device).ok();

            Ok(DeviceMetrics {
                temperature: Some(temperature as f32 / 1000.0),
                hotspot_temperature: None,
                board_power: board_power.map(|p| p as f32 / 1e6),
                fan_rpm: None,
            })
        }
        #[cfg(not(all(unix, feature = "rocm")))]
        {
            Err(HardmonError::adapter_not_found(adapter.name.as_str()))
        }
    }

    fn current_fps(&self, _adapter: &SessionAdapter) -> Result<Option<f32>> {
        Ok(None)
    }
}

/// Opens [`RocmSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RocmDriver;

impl MetricsSessionDriver for RocmDriver {
    fn open(&self) -> Result<Arc<dyn MetricsSession>> {
        #[cfg(all(unix, feature = "rocm"))]
        {
            let rocm = RocmSmi::init()
                .map_err(|e| HardmonError::gpu_not_available(format!("Failed to init ROCm SMI: {:?}", e)))?;

            let device_count = rocm
                .get_device_count()
                .map_err(|e| HardmonError::gpu_not_available(format!("Failed to get device count: {:?}", e)))?;

            if device_count == 0 {
                return Err(HardmonError::gpu_not_available("ROCm SMI reports no devices"));
            }

            Ok(Arc::new(RocmSession {
                rocm: parking_lot::Mutex::new(rocm),
                device_count: device_count as u32,
            }))
        }
        #[cfg(not(all(unix, feature = "rocm")))]
        {
            Err(HardmonError::gpu_not_available(
                "ROCm support not enabled or not on Unix",
            ))
        }
    }
}
