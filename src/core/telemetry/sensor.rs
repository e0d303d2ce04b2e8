//! Shared sensor/value model.
//!
//! A reading is either a number or absent. Absence means "unknown this
//! cycle" and is never folded into zero; zero is a legitimate reading.

use serde::{Deserialize, Serialize};

/// Physical quantity measured by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Degrees Celsius
    Temperature,
    /// Watts
    Power,
    /// Megahertz
    Clock,
    /// Volts
    Voltage,
    /// Percent
    Load,
    /// Revolutions per minute
    Fan,
    /// Percent of maximum fan duty
    FanPercent,
}

impl SensorKind {
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Power => "W",
            SensorKind::Clock => "MHz",
            SensorKind::Voltage => "V",
            SensorKind::Load | SensorKind::FanPercent => "%",
            SensorKind::Fan => "RPM",
        }
    }
}

/// A single named sensor with its current reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub kind: SensorKind,
    pub label: String,
    /// Disambiguates multiple instances of the same kind on one device.
    pub index: usize,
    pub value: Option<f32>,
}

impl Sensor {
    pub fn new(kind: SensorKind, label: impl Into<String>) -> Self {
        Self::indexed(kind, label, 0)
    }

    pub fn indexed(kind: SensorKind, label: impl Into<String>, index: usize) -> Self {
        Self {
            kind,
            label: label.into(),
            index,
            value: None,
        }
    }

    pub fn set(&mut self, value: Option<f32>) {
        self.value = value;
    }

    pub fn clear(&mut self) {
        self.value = None;
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }
}

/// True when every sensor in the set is absent (an empty set counts).
pub fn all_absent<'a, I>(sensors: I) -> bool
where
    I: IntoIterator<Item = &'a Sensor>,
{
    sensors.into_iter().all(Sensor::is_absent)
}

/// Sum of readings, absent if any contributor is absent or there are none.
pub fn sum_present<I>(values: I) -> Option<f32>
where
    I: IntoIterator<Item = Option<f32>>,
{
    let mut total = 0.0f32;
    let mut seen = false;
    for value in values {
        total += value?;
        seen = true;
    }
    seen.then_some(total)
}
