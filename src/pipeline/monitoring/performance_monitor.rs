use super::metrics::MetricsObserver;
use super::system::{BatteryClass, SystemReading, ThermalState};
use crate::config::MonitorSettings;
use crate::pipeline::domain::CombinedResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Timestamped system observation kept in the snapshot ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub taken_at: DateTime<Utc>,
    /// Rolling average frame latency at the time of the snapshot.
    pub latency_us: u64,
    pub memory_bytes: u64,
    pub thermal: ThermalState,
    pub battery_level: f32,
    pub charging: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub frames_processed: u64,
    pub average_latency_ms: f64,
    pub peak_latency_ms: f64,
    pub frames_per_second: f32,
    pub memory_mb: f64,
    pub thermal: ThermalState,
    pub battery: BatteryClass,
    pub healthy: bool,
}

struct MonitorState {
    latencies: VecDeque<Duration>,
    completions: VecDeque<Instant>,
    snapshots: VecDeque<PerformanceSnapshot>,
    frames_processed: u64,
}

/// Rolling latency and system-signal history backing throttle decisions.
///
/// Both buffers are bounded; the oldest entry is evicted once full.
pub struct PerformanceMonitor {
    settings: MonitorSettings,
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    pub fn new(settings: &MonitorSettings) -> Self {
        let settings = MonitorSettings {
            latency_window: settings.latency_window.max(1),
            snapshot_window: settings.snapshot_window.max(1),
            ..settings.clone()
        };
        let state = MonitorState {
            latencies: VecDeque::with_capacity(settings.latency_window),
            completions: VecDeque::with_capacity(settings.latency_window),
            snapshots: VecDeque::with_capacity(settings.snapshot_window),
            frames_processed: 0,
        };

        Self {
            settings,
            state: Mutex::new(state),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn record_frame(&self, latency: Duration) {
        self.record_frame_at(latency, Instant::now());
    }

    pub fn record_frame_at(&self, latency: Duration, completed_at: Instant) {
        let window = self.settings.latency_window;
        let mut state = self.state();
        state.frames_processed += 1;

        state.latencies.push_back(latency);
        while state.latencies.len() > window {
            state.latencies.pop_front();
        }
        state.completions.push_back(completed_at);
        while state.completions.len() > window {
            state.completions.pop_front();
        }
    }

    /// Append a system reading to the snapshot buffer, stamped with the current average latency.
    pub fn record_snapshot(&self, reading: SystemReading) -> PerformanceSnapshot {
        let window = self.settings.snapshot_window;
        let max_age = self.settings.latency_max_age();
        let mut state = self.state();
        let snapshot = PerformanceSnapshot {
            taken_at: Utc::now(),
            latency_us: recent_average(&state, Instant::now(), max_age).as_micros() as u64,
            memory_bytes: reading.memory_bytes,
            thermal: reading.thermal,
            battery_level: reading.battery_level,
            charging: reading.charging,
        };

        state.snapshots.push_back(snapshot);
        while state.snapshots.len() > window {
            state.snapshots.pop_front();
        }
        debug!(
            "Performance snapshot: latency={}us memory={}B thermal={:?} battery={:.2}",
            snapshot.latency_us, snapshot.memory_bytes, snapshot.thermal, snapshot.battery_level
        );
        snapshot
    }

    /// Zero until the first frame completes, and again once every sample has aged out.
    pub fn average_latency(&self) -> Duration {
        self.average_latency_at(Instant::now())
    }

    /// Average over the samples completed within `latency_max_age` of `now`.
    pub fn average_latency_at(&self, now: Instant) -> Duration {
        recent_average(&self.state(), now, self.settings.latency_max_age())
    }

    pub fn peak_latency(&self) -> Duration {
        self.state()
            .latencies
            .iter()
            .copied()
            .max()
            .unwrap_or_default()
    }

    pub fn latest_snapshot(&self) -> Option<PerformanceSnapshot> {
        self.state().snapshots.back().copied()
    }

    pub fn snapshots(&self) -> Vec<PerformanceSnapshot> {
        self.state().snapshots.iter().copied().collect()
    }

    pub fn thermal_state(&self) -> ThermalState {
        self.latest_snapshot()
            .map(|s| s.thermal)
            .unwrap_or_default()
    }

    pub fn battery_class(&self) -> BatteryClass {
        let reading = self
            .latest_snapshot()
            .map(|s| SystemReading {
                memory_bytes: s.memory_bytes,
                thermal: s.thermal,
                battery_level: s.battery_level,
                charging: s.charging,
            })
            .unwrap_or_default();
        reading.battery_class(self.settings.low_battery_threshold)
    }

    /// Completed frames per second over the latency window.
    pub fn frames_per_second(&self) -> f32 {
        let state = self.state();
        match (state.completions.front(), state.completions.back()) {
            (Some(first), Some(last)) if state.completions.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f32();
                if span > 0.0 {
                    (state.completions.len() - 1) as f32 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    /// Every tracked metric within its configured bound.
    pub fn is_healthy(&self) -> bool {
        let latency_ok = self.average_latency() <= self.settings.target_latency();
        let system_ok = match self.latest_snapshot() {
            Some(snapshot) => {
                snapshot.memory_bytes <= self.settings.max_memory_bytes()
                    && !snapshot.thermal.is_pressure()
                    && !matches!(
                        self.battery_class(),
                        BatteryClass::Low | BatteryClass::Critical
                    )
            }
            None => true,
        };
        latency_ok && system_ok
    }

    pub fn summary(&self) -> PerformanceSummary {
        let frames_processed = self.state().frames_processed;
        let memory_bytes = self
            .latest_snapshot()
            .map(|s| s.memory_bytes)
            .unwrap_or_default();

        PerformanceSummary {
            frames_processed,
            average_latency_ms: self.average_latency().as_secs_f64() * 1_000.0,
            peak_latency_ms: self.peak_latency().as_secs_f64() * 1_000.0,
            frames_per_second: self.frames_per_second(),
            memory_mb: memory_bytes as f64 / (1024.0 * 1024.0),
            thermal: self.thermal_state(),
            battery: self.battery_class(),
            healthy: self.is_healthy(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn recent_average(state: &MonitorState, now: Instant, max_age: Duration) -> Duration {
    let recent: Vec<Duration> = state
        .latencies
        .iter()
        .zip(state.completions.iter())
        .filter(|(_, completed_at)| now.saturating_duration_since(**completed_at) <= max_age)
        .map(|(latency, _)| *latency)
        .collect();
    if recent.is_empty() {
        return Duration::ZERO;
    }
    recent.iter().sum::<Duration>() / recent.len() as u32
}

impl MetricsObserver for PerformanceMonitor {
    fn on_frame_processed(&self, _result: &CombinedResult, latency: Duration) {
        self.record_frame(latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(latency_window: usize, snapshot_window: usize) -> PerformanceMonitor {
        PerformanceMonitor::new(&MonitorSettings {
            latency_window,
            snapshot_window,
            ..MonitorSettings::default()
        })
    }

    #[test]
    fn latency_buffer_is_bounded_and_averaged() {
        let monitor = monitor(3, 10);
        for ms in [100, 10, 20, 30] {
            monitor.record_frame(Duration::from_millis(ms));
        }
        // The 100ms sample was evicted.
        assert_eq!(monitor.average_latency(), Duration::from_millis(20));
        assert_eq!(monitor.peak_latency(), Duration::from_millis(30));
        assert_eq!(monitor.summary().frames_processed, 4);
    }

    #[test]
    fn empty_monitor_is_healthy_with_zero_latency() {
        let monitor = monitor(5, 5);
        assert_eq!(monitor.average_latency(), Duration::ZERO);
        assert!(monitor.is_healthy());
        assert_eq!(monitor.frames_per_second(), 0.0);
    }

    #[test]
    fn snapshot_buffer_evicts_oldest() {
        let monitor = monitor(5, 2);
        for memory_bytes in [1, 2, 3] {
            monitor.record_snapshot(SystemReading {
                memory_bytes,
                ..SystemReading::default()
            });
        }
        let snapshots = monitor.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].memory_bytes, 2);
    }

    #[test]
    fn unhealthy_when_any_signal_is_out_of_bounds() {
        let monitor = monitor(5, 5);
        monitor.record_snapshot(SystemReading {
            thermal: ThermalState::Serious,
            ..SystemReading::default()
        });
        assert!(!monitor.is_healthy());

        monitor.record_snapshot(SystemReading::default());
        assert!(monitor.is_healthy());

        monitor.record_snapshot(SystemReading {
            battery_level: 0.1,
            ..SystemReading::default()
        });
        assert_eq!(monitor.battery_class(), BatteryClass::Low);
        assert!(!monitor.is_healthy());

        monitor.record_snapshot(SystemReading::default());
        monitor.record_frame(Duration::from_millis(500));
        assert!(!monitor.is_healthy());
    }

    #[test]
    fn fps_counts_completions_over_their_span() {
        let monitor = monitor(10, 5);
        let start = Instant::now();
        for i in 0..5 {
            let completed_at = start + Duration::from_millis(250 * i);
            monitor.record_frame_at(Duration::from_millis(5), completed_at);
        }
        // Four intervals across one second.
        assert!((monitor.frames_per_second() - 4.0).abs() < 1e-3);
    }

    #[test]
    fn stale_latency_samples_age_out_of_the_average() {
        let monitor = PerformanceMonitor::new(&MonitorSettings {
            latency_max_age_ms: 3_000,
            ..MonitorSettings::default()
        });
        let start = Instant::now();
        monitor.record_frame_at(Duration::from_millis(200), start);
        monitor.record_frame_at(Duration::from_millis(40), start + Duration::from_secs(4));

        assert_eq!(
            monitor.average_latency_at(start + Duration::from_secs(1)),
            Duration::from_millis(120)
        );
        // Only the 40ms frame is recent enough.
        assert_eq!(
            monitor.average_latency_at(start + Duration::from_secs(5)),
            Duration::from_millis(40)
        );
        // A stalled pipeline no longer reports the old latency.
        assert_eq!(
            monitor.average_latency_at(start + Duration::from_secs(10)),
            Duration::ZERO
        );
    }
}
