use crate::config::ThrottleSettings;
use crate::pipeline::domain::ThrottleLevel;
use crate::pipeline::monitoring::{SystemReading, ThermalState};
use std::time::{Duration, Instant};

/// Inputs to one throttle evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSignals {
    pub thermal: ThermalState,
    pub battery_low: bool,
    pub average_latency: Duration,
}

impl PressureSignals {
    pub fn new(
        reading: &SystemReading,
        average_latency: Duration,
        low_battery_threshold: f32,
    ) -> Self {
        Self {
            thermal: reading.thermal,
            battery_low: reading.is_battery_low(low_battery_threshold),
            average_latency,
        }
    }

    pub fn calm() -> Self {
        Self {
            thermal: ThermalState::Nominal,
            battery_low: false,
            average_latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Hold,
    Escalated { from: ThrottleLevel, to: ThrottleLevel },
    Deescalated { from: ThrottleLevel, to: ThrottleLevel },
}

impl ThrottleDecision {
    pub fn changed(&self) -> bool {
        !matches!(self, ThrottleDecision::Hold)
    }
}

/// Throttle state machine.
///
/// Pressure raises the level one step per tick, except critical thermal which
/// jumps straight to `Aggressive`. Once every signal is clear the level falls
/// one step per full debounce window of continuous calm.
#[derive(Debug, Clone)]
pub struct ThrottleController {
    level: ThrottleLevel,
    clear_since: Option<Instant>,
    target_latency: Duration,
    latency_margin: f32,
    debounce: Duration,
}

impl ThrottleController {
    pub fn new(settings: &ThrottleSettings, target_latency: Duration) -> Self {
        Self {
            level: settings.initial_level,
            clear_since: None,
            target_latency,
            latency_margin: settings.latency_margin.max(1.0),
            debounce: settings.debounce(),
        }
    }

    pub fn level(&self) -> ThrottleLevel {
        self.level
    }

    fn latency_pressure(&self, signals: &PressureSignals) -> bool {
        signals.average_latency.as_secs_f64()
            > self.target_latency.as_secs_f64() * self.latency_margin as f64
    }

    pub fn is_under_pressure(&self, signals: &PressureSignals) -> bool {
        signals.thermal.is_pressure() || signals.battery_low || self.latency_pressure(signals)
    }

    /// Names of the signals currently applying pressure, for logging.
    pub fn pressure_sources(&self, signals: &PressureSignals) -> Vec<&'static str> {
        let mut sources = Vec::new();
        if signals.thermal.is_pressure() {
            sources.push("thermal");
        }
        if signals.battery_low {
            sources.push("battery");
        }
        if self.latency_pressure(signals) {
            sources.push("latency");
        }
        sources
    }

    pub fn tick_at(&mut self, now: Instant, signals: &PressureSignals) -> ThrottleDecision {
        let from = self.level;

        if signals.thermal == ThermalState::Critical {
            self.clear_since = None;
            self.level = ThrottleLevel::Aggressive;
        } else if self.is_under_pressure(signals) {
            self.clear_since = None;
            self.level = self.level.escalate();
        } else {
            match self.clear_since {
                None => self.clear_since = Some(now),
                Some(since) if now.saturating_duration_since(since) >= self.debounce => {
                    self.level = self.level.deescalate();
                    // The next step down needs its own full window.
                    self.clear_since = Some(now);
                }
                Some(_) => {}
            }
        }

        match self.level.cmp(&from) {
            std::cmp::Ordering::Greater => ThrottleDecision::Escalated {
                from,
                to: self.level,
            },
            std::cmp::Ordering::Less => ThrottleDecision::Deescalated {
                from,
                to: self.level,
            },
            std::cmp::Ordering::Equal => ThrottleDecision::Hold,
        }
    }
}
