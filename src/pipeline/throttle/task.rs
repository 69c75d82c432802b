use super::controller::{PressureSignals, ThrottleController, ThrottleDecision};
use super::publisher::QualityPublisher;
use crate::pipeline::monitoring::{PerformanceMonitor, SystemProbe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic feedback loop: sample the platform, evaluate pressure, publish quality.
pub struct ThrottleTask {
    controller: ThrottleController,
    publisher: QualityPublisher,
    probe: Arc<dyn SystemProbe>,
    monitor: Arc<PerformanceMonitor>,
    tick_interval: Duration,
}

impl ThrottleTask {
    pub fn new(
        controller: ThrottleController,
        publisher: QualityPublisher,
        probe: Arc<dyn SystemProbe>,
        monitor: Arc<PerformanceMonitor>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            controller,
            publisher,
            probe,
            monitor,
            tick_interval,
        }
    }

    pub fn level(&self) -> crate::pipeline::domain::ThrottleLevel {
        self.controller.level()
    }

    /// One controller tick at `now`.
    pub fn step(&mut self, now: Instant) -> ThrottleDecision {
        let reading = self.probe.sample();
        self.monitor.record_snapshot(reading);

        let signals = PressureSignals::new(
            &reading,
            self.monitor.average_latency(),
            self.monitor.settings().low_battery_threshold,
        );
        let decision = self.controller.tick_at(now, &signals);

        match decision {
            ThrottleDecision::Escalated { from, to } => {
                warn!(
                    "Throttle escalated {} -> {} (pressure: {})",
                    from,
                    to,
                    self.controller.pressure_sources(&signals).join(", ")
                );
            }
            ThrottleDecision::Deescalated { from, to } => {
                info!("Throttle relaxed {} -> {}", from, to);
            }
            ThrottleDecision::Hold => {}
        }

        let snapshot = self.publisher.publish(self.controller.level());
        if decision.changed() {
            debug!(
                "Quality now {} (budget {}, interval {}ms, downsample x{})",
                snapshot.quality_level,
                snapshot.profile.max_analyzers,
                snapshot.profile.target_interval_ms,
                snapshot.profile.downsample_factor
            );
        }
        decision
    }

    pub async fn run(mut self, cancel_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    self.step(Instant::now());
                }
            }
        }
        info!("Throttle loop stopped at level {}", self.controller.level());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitorSettings, ThrottleSettings};
    use crate::pipeline::domain::{QualityLevel, QualityProfiles, ThrottleLevel};
    use crate::pipeline::monitoring::{SharedSystemSignals, ThermalState};

    fn task(signals: Arc<SharedSystemSignals>) -> (ThrottleTask, Arc<PerformanceMonitor>) {
        let monitor_settings = MonitorSettings::default();
        let monitor = Arc::new(PerformanceMonitor::new(&monitor_settings));
        let controller =
            ThrottleController::new(&ThrottleSettings::default(), monitor_settings.target_latency());
        let (publisher, _receiver) = QualityPublisher::new(
            ThrottleLevel::None,
            QualityLevel::High,
            QualityProfiles::default(),
        );
        let task = ThrottleTask::new(
            controller,
            publisher,
            signals,
            monitor.clone(),
            Duration::from_millis(10),
        );
        (task, monitor)
    }

    #[test]
    fn critical_reading_publishes_minimal_quality() {
        let signals = Arc::new(SharedSystemSignals::new());
        let (mut task, monitor) = task(signals.clone());
        let receiver = task.publisher.subscribe();

        signals.update_thermal(ThermalState::Critical);
        task.step(Instant::now());

        assert_eq!(task.level(), ThrottleLevel::Aggressive);
        assert_eq!(receiver.borrow().quality_level, QualityLevel::Minimal);
        assert_eq!(monitor.snapshots().len(), 1);
        assert_eq!(monitor.thermal_state(), ThermalState::Critical);
    }

    #[test]
    fn slow_frames_escalate_through_the_monitor() {
        let signals = Arc::new(SharedSystemSignals::new());
        let (mut task, monitor) = task(signals);
        for _ in 0..5 {
            monitor.record_frame(Duration::from_millis(200));
        }

        let decision = task.step(Instant::now());
        assert_eq!(
            decision,
            ThrottleDecision::Escalated {
                from: ThrottleLevel::None,
                to: ThrottleLevel::Light
            }
        );
    }

    #[test]
    fn charging_device_is_not_battery_pressure() {
        let signals = Arc::new(SharedSystemSignals::new());
        let (mut task, _monitor) = task(signals.clone());

        signals.update_battery(0.05, true);
        assert_eq!(task.step(Instant::now()), ThrottleDecision::Hold);

        signals.update_battery(0.05, false);
        assert!(task.step(Instant::now()).changed());
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let signals = Arc::new(SharedSystemSignals::new());
        signals.update_thermal(ThermalState::Serious);
        let (task, monitor) = task(signals);

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(task.run(cancel_token.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_token.cancel();
        handle.await.unwrap();

        assert!(!monitor.snapshots().is_empty());
    }
}
