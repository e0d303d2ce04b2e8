//! Energy-counter differentiation (energy → power).

use std::time::Instant;

/// Samples closer together than this keep the previous power value.
pub const MIN_ELAPSED_SECS: f64 = 0.01;

/// Joules per counter tick from the RAPL power-unit register.
pub fn energy_unit(power_unit_raw: u32) -> f32 {
    let shift = (power_unit_raw >> 8) & 0x1F;
    1.0 / (1u64 << shift) as f32
}

/// Ticks elapsed between two reads of a 32-bit counter, across wraparound.
pub fn energy_delta(previous: u32, current: u32) -> u32 {
    current.wrapping_sub(previous)
}

/// Cursor and last derived power for one package or core.
#[derive(Debug, Clone, Copy)]
pub struct EnergyCounter {
    last_raw: u32,
    last_time: Instant,
    power: Option<f32>,
}

impl EnergyCounter {
    pub fn new(raw: u32, time: Instant) -> Self {
        Self {
            last_raw: raw,
            last_time: time,
            power: None,
        }
    }

    /// Feed a new counter read. Commits the power value and advances the
    /// cursor only when more than [`MIN_ELAPSED_SECS`] passed.
    pub fn sample(&mut self, raw: u32, time: Instant, unit: f32) -> Option<f32> {
        let elapsed = time.saturating_duration_since(self.last_time).as_secs_f64();
        if elapsed > MIN_ELAPSED_SECS {
            let delta = energy_delta(self.last_raw, raw);
            self.power = Some((unit as f64 * delta as f64 / elapsed) as f32);
            self.last_raw = raw;
            self.last_time = time;
        }
        self.power
    }

    pub fn power(&self) -> Option<f32> {
        self.power
    }

    pub fn cursor(&self) -> (u32, Instant) {
        (self.last_raw, self.last_time)
    }
}

/// Counter slot that primes itself on the first successful read.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyTracker {
    counter: Option<EnergyCounter>,
}

impl EnergyTracker {
    pub fn primed(raw: Option<u32>, time: Instant) -> Self {
        Self {
            counter: raw.map(|raw| EnergyCounter::new(raw, time)),
        }
    }

    /// Apply one read. A failed read (`None`) reports no power for this
    /// cycle and leaves the cursor untouched.
    pub fn update(&mut self, raw: Option<u32>, time: Instant, unit: f32) -> Option<f32> {
        match (&mut self.counter, raw) {
            (Some(counter), Some(raw)) => counter.sample(raw, time, unit),
            (None, Some(raw)) => {
                self.counter = Some(EnergyCounter::new(raw, time));
                None
            }
            (_, None) => None,
        }
    }

    pub fn power(&self) -> Option<f32> {
        self.counter.as_ref().and_then(EnergyCounter::power)
    }
}
