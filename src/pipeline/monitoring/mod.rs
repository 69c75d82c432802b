pub mod metrics;
pub mod performance_monitor;
pub mod system;

pub use metrics::{
    AnalyzerCounts, BottleneckInfo, BottleneckTracker, MetricsCollector, MetricsObserver,
    MetricsSnapshot, PipelineMetrics,
};
pub use performance_monitor::{PerformanceMonitor, PerformanceSnapshot, PerformanceSummary};
pub use system::{BatteryClass, SharedSystemSignals, SystemProbe, SystemReading, ThermalState};
