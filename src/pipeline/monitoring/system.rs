use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Platform thermal pressure, ordered from coolest to hottest.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ThermalState {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    /// Serious and critical both count as throttle pressure.
    pub fn is_pressure(&self) -> bool {
        *self >= ThermalState::Serious
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryClass {
    Critical,
    Low,
    Normal,
    Charging,
}

/// One observation of the platform signals the pipeline does not compute itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemReading {
    pub memory_bytes: u64,
    pub thermal: ThermalState,
    /// Charge in `[0, 1]`.
    pub battery_level: f32,
    pub charging: bool,
}

impl SystemReading {
    pub fn battery_class(&self, low_threshold: f32) -> BatteryClass {
        if self.charging {
            BatteryClass::Charging
        } else if self.battery_level < low_threshold / 2.0 {
            BatteryClass::Critical
        } else if self.battery_level < low_threshold {
            BatteryClass::Low
        } else {
            BatteryClass::Normal
        }
    }

    /// A draining battery below the threshold; charging never counts.
    pub fn is_battery_low(&self, low_threshold: f32) -> bool {
        matches!(
            self.battery_class(low_threshold),
            BatteryClass::Low | BatteryClass::Critical
        )
    }
}

impl Default for SystemReading {
    fn default() -> Self {
        Self {
            memory_bytes: 0,
            thermal: ThermalState::Nominal,
            battery_level: 1.0,
            charging: false,
        }
    }
}

/// Source of memory, thermal and battery readings, sampled once per throttle tick.
pub trait SystemProbe: Send + Sync {
    fn sample(&self) -> SystemReading;
}

/// Push-style probe: platform observers write into it whenever a signal changes.
#[derive(Debug, Default)]
pub struct SharedSystemSignals {
    reading: Mutex<SystemReading>,
}

impl SharedSystemSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_thermal(&self, thermal: ThermalState) {
        self.reading().thermal = thermal;
    }

    pub fn update_battery(&self, level: f32, charging: bool) {
        let mut reading = self.reading();
        reading.battery_level = level.clamp(0.0, 1.0);
        reading.charging = charging;
    }

    pub fn update_memory(&self, memory_bytes: u64) {
        self.reading().memory_bytes = memory_bytes;
    }

    fn reading(&self) -> std::sync::MutexGuard<'_, SystemReading> {
        self.reading.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SystemProbe for SharedSystemSignals {
    fn sample(&self) -> SystemReading {
        *self.reading()
    }
}
