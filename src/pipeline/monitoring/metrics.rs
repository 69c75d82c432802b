use super::performance_monitor::{PerformanceMonitor, PerformanceSummary};
use crate::pipeline::domain::{
    AnalyzerType, CombinedResult, QualityLevel, QualitySnapshot, ThrottleLevel,
};
use crate::pipeline::orchestration::dispatcher::{AnalyzerOutcome, AnalyzerReport};
use crate::pipeline::orchestration::scheduler::DropReason;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::warn;

/// Observer pattern for metrics collection
pub trait MetricsObserver: Send + Sync {
    fn on_frame_dropped(&self, _reason: DropReason) {}

    fn on_frame_processed(&self, _result: &CombinedResult, _latency: Duration) {}

    fn on_analyzer_finished(&self, _report: &AnalyzerReport) {}
}

/// Collects and manages multiple metrics observers
#[derive(Clone, Default)]
pub struct MetricsCollector {
    observers: Vec<Arc<dyn MetricsObserver>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(mut self, observer: Arc<dyn MetricsObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl MetricsObserver for MetricsCollector {
    fn on_frame_dropped(&self, reason: DropReason) {
        for observer in &self.observers {
            observer.on_frame_dropped(reason);
        }
    }

    fn on_frame_processed(&self, result: &CombinedResult, latency: Duration) {
        for observer in &self.observers {
            observer.on_frame_processed(result, latency);
        }
    }

    fn on_analyzer_finished(&self, report: &AnalyzerReport) {
        for observer in &self.observers {
            observer.on_analyzer_finished(report);
        }
    }
}

/// Per-analyzer outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzerCounts {
    pub produced: u64,
    pub empty: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub total_time_us: u64,
}

impl AnalyzerCounts {
    /// Runs that completed normally, with or without a result.
    pub fn successes(&self) -> u64 {
        self.produced + self.empty
    }

    pub fn failures(&self) -> u64 {
        self.failed + self.timed_out
    }

    pub fn average_time_us(&self) -> u64 {
        let runs = self.successes() + self.failures();
        if runs == 0 {
            0
        } else {
            self.total_time_us / runs
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Counters {
    frames_processed: u64,
    empty_frames: u64,
    dropped: IndexMap<DropReason, u64>,
    analyzers: IndexMap<AnalyzerType, AnalyzerCounts>,
}

/// Frame and analyzer counters for the telemetry snapshot.
#[derive(Default)]
pub struct PipelineMetrics {
    counters: Mutex<Counters>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_processed(&self) -> u64 {
        self.counters().frames_processed
    }

    /// Processed frames whose combined result held no analyzer output.
    pub fn empty_frames(&self) -> u64 {
        self.counters().empty_frames
    }

    pub fn frames_dropped(&self) -> u64 {
        self.counters().dropped.values().sum()
    }

    pub fn dropped_by_reason(&self, reason: DropReason) -> u64 {
        self.counters().dropped.get(&reason).copied().unwrap_or(0)
    }

    pub fn analyzer_counts(&self, analyzer_type: AnalyzerType) -> AnalyzerCounts {
        self.counters()
            .analyzers
            .get(&analyzer_type)
            .copied()
            .unwrap_or_default()
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsObserver for PipelineMetrics {
    fn on_frame_dropped(&self, reason: DropReason) {
        *self.counters().dropped.entry(reason).or_insert(0) += 1;
    }

    fn on_frame_processed(&self, result: &CombinedResult, _latency: Duration) {
        let mut counters = self.counters();
        counters.frames_processed += 1;
        if result.is_empty() {
            counters.empty_frames += 1;
        }
    }

    fn on_analyzer_finished(&self, report: &AnalyzerReport) {
        let mut counters = self.counters();
        let counts = counters.analyzers.entry(report.analyzer_type).or_default();
        match report.outcome {
            AnalyzerOutcome::Produced(_) => counts.produced += 1,
            AnalyzerOutcome::Empty => counts.empty += 1,
            AnalyzerOutcome::Failed(_) => counts.failed += 1,
            AnalyzerOutcome::TimedOut => counts.timed_out += 1,
        }
        counts.total_time_us += report.elapsed.as_micros() as u64;
    }
}

const MAX_RECENT_FRAMES: usize = 10;
const MAX_WARNINGS: usize = 5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BottleneckInfo {
    pub last_frame: Option<uuid::Uuid>,
    pub recent_frame_times_us: Vec<u64>,
    pub warnings: Vec<String>,
}

/// Keeps the last few frame times and a short list of slow-frame and slow-analyzer warnings.
pub struct BottleneckTracker {
    slow_frame: Duration,
    slow_analyzer: Duration,
    info: Mutex<BottleneckInfo>,
}

impl BottleneckTracker {
    pub fn new(slow_frame: Duration, slow_analyzer: Duration) -> Self {
        Self {
            slow_frame,
            slow_analyzer,
            info: Mutex::new(BottleneckInfo::default()),
        }
    }

    pub fn info(&self) -> BottleneckInfo {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BottleneckInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_warning(info: &mut BottleneckInfo, warning: String) {
        warn!("{}", warning);
        info.warnings.push(warning);
        if info.warnings.len() > MAX_WARNINGS {
            info.warnings.remove(0);
        }
    }
}

impl MetricsObserver for BottleneckTracker {
    fn on_frame_processed(&self, result: &CombinedResult, latency: Duration) {
        let mut info = self.lock();
        info.last_frame = Some(result.frame_id);

        info.recent_frame_times_us.push(latency.as_micros() as u64);
        if info.recent_frame_times_us.len() > MAX_RECENT_FRAMES {
            info.recent_frame_times_us.remove(0);
        }

        if latency > self.slow_frame {
            let warning = format!(
                "Slow frame processing: {}us for frame {}",
                latency.as_micros(),
                result.frame_id
            );
            Self::push_warning(&mut info, warning);
        }
    }

    fn on_analyzer_finished(&self, report: &AnalyzerReport) {
        let warning = match report.outcome {
            AnalyzerOutcome::TimedOut => {
                format!("{} analyzer missed the dispatch deadline", report.analyzer_type)
            }
            _ if report.elapsed > self.slow_analyzer => format!(
                "Slow {} analyzer: {}us",
                report.analyzer_type,
                report.elapsed.as_micros()
            ),
            _ => return,
        };
        Self::push_warning(&mut self.lock(), warning);
    }
}

/// Point-in-time telemetry view: what the external reporting layer consumes.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub dropped_by_reason: IndexMap<DropReason, u64>,
    pub empty_frames: u64,
    pub average_latency_ms: f64,
    pub throttle_level: ThrottleLevel,
    pub quality_level: QualityLevel,
    pub analyzers: IndexMap<AnalyzerType, AnalyzerCounts>,
    pub performance: PerformanceSummary,
    pub bottlenecks: Vec<String>,
}

impl MetricsSnapshot {
    pub fn collect(
        metrics: &PipelineMetrics,
        monitor: &PerformanceMonitor,
        bottlenecks: &BottleneckTracker,
        quality: QualitySnapshot,
    ) -> Self {
        let counters = metrics.counters().clone();
        let performance = monitor.summary();

        Self {
            taken_at: Utc::now(),
            frames_processed: counters.frames_processed,
            frames_dropped: counters.dropped.values().sum(),
            dropped_by_reason: counters.dropped,
            empty_frames: counters.empty_frames,
            average_latency_ms: performance.average_latency_ms,
            throttle_level: quality.throttle_level,
            quality_level: quality.quality_level,
            analyzers: counters.analyzers,
            performance,
            bottlenecks: bottlenecks.info().warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorSettings;
    use crate::pipeline::domain::{AnalysisResult, QualityProfiles};
    use uuid::Uuid;

    fn combined(results: Vec<AnalysisResult>) -> CombinedResult {
        CombinedResult {
            frame_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            quality_level: QualityLevel::High,
            results,
            overall_confidence: 0.0,
            suggestions: Vec::new(),
            processing_time_us: 0,
        }
    }

    fn report(analyzer_type: AnalyzerType, outcome: AnalyzerOutcome, ms: u64) -> AnalyzerReport {
        AnalyzerReport {
            analyzer_type,
            outcome,
            elapsed: Duration::from_millis(ms),
        }
    }

    #[test]
    fn collector_fans_out_to_every_observer() {
        let first = Arc::new(PipelineMetrics::new());
        let second = Arc::new(PipelineMetrics::new());
        let collector = MetricsCollector::new()
            .add_observer(first.clone())
            .add_observer(second.clone());

        collector.on_frame_dropped(DropReason::TooSoon);
        collector.on_frame_processed(&combined(Vec::new()), Duration::from_millis(3));

        for metrics in [first, second] {
            assert_eq!(metrics.frames_dropped(), 1);
            assert_eq!(metrics.dropped_by_reason(DropReason::TooSoon), 1);
            assert_eq!(metrics.frames_processed(), 1);
            assert_eq!(metrics.empty_frames(), 1);
        }
    }

    #[test]
    fn analyzer_outcomes_are_counted_per_type() {
        let metrics = PipelineMetrics::new();
        let result = AnalysisResult::new(AnalyzerType::Focus, 0.9);
        metrics.on_analyzer_finished(&report(
            AnalyzerType::Focus,
            AnalyzerOutcome::Produced(result),
            2,
        ));
        metrics.on_analyzer_finished(&report(AnalyzerType::Focus, AnalyzerOutcome::Empty, 2));
        metrics.on_analyzer_finished(&report(
            AnalyzerType::Focus,
            AnalyzerOutcome::Failed("bad input".to_string()),
            2,
        ));
        metrics.on_analyzer_finished(&report(
            AnalyzerType::Lighting,
            AnalyzerOutcome::TimedOut,
            9,
        ));

        let focus = metrics.analyzer_counts(AnalyzerType::Focus);
        assert_eq!(focus.successes(), 2);
        assert_eq!(focus.failures(), 1);
        assert_eq!(focus.average_time_us(), 2_000);
        assert_eq!(metrics.analyzer_counts(AnalyzerType::Lighting).timed_out, 1);
        assert_eq!(metrics.analyzer_counts(AnalyzerType::Subject), AnalyzerCounts::default());
    }

    #[test]
    fn bottleneck_warnings_are_bounded() {
        let tracker = BottleneckTracker::new(Duration::from_millis(10), Duration::from_millis(5));
        for _ in 0..8 {
            tracker.on_frame_processed(&combined(Vec::new()), Duration::from_millis(20));
        }
        tracker.on_frame_processed(&combined(Vec::new()), Duration::from_millis(1));
        tracker.on_analyzer_finished(&report(
            AnalyzerType::Exposure,
            AnalyzerOutcome::TimedOut,
            1,
        ));

        let info = tracker.info();
        assert_eq!(info.warnings.len(), 5);
        assert!(info.warnings[4].contains("exposure"));
        assert_eq!(info.recent_frame_times_us.len(), 9);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let metrics = PipelineMetrics::new();
        metrics.on_frame_dropped(DropReason::InFlight);
        let monitor = PerformanceMonitor::new(&MonitorSettings::default());
        let tracker = BottleneckTracker::new(Duration::from_secs(1), Duration::from_secs(1));
        let quality = QualitySnapshot::resolve(
            ThrottleLevel::Light,
            QualityLevel::High,
            &QualityProfiles::default(),
        );

        let snapshot = MetricsSnapshot::collect(&metrics, &monitor, &tracker, quality);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["frames_dropped"], 1);
        assert_eq!(json["dropped_by_reason"]["in_flight"], 1);
        assert_eq!(json["throttle_level"], "light");
        assert_eq!(json["quality_level"], "medium");
    }
}
