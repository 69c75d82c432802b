use crate::{
    common::Frame,
    config::Configuration,
    error::AppError,
    intake::FrameSource,
    pipeline::{
        analysis::{default_analyzer, Analyzer, AnalyzerRegistry},
        domain::{AnalyzerType, CombinedResult, QualitySnapshot},
        monitoring::{
            BottleneckTracker, MetricsCollector, MetricsObserver, MetricsSnapshot,
            PerformanceMonitor, PipelineMetrics, SharedSystemSignals, SystemProbe,
        },
        orchestration::{
            run_worker, Admission, AdmittedFrame, Aggregator, DispatchMode, Dispatcher,
            FrameProcessor, FrameScheduler, ResultConsumer,
        },
        throttle::{QualityPublisher, ThrottleController, ThrottleTask},
    },
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Running pipeline: scheduler in front, one frame worker and the throttle loop behind it.
pub struct Coordinator {
    scheduler: Arc<FrameScheduler>,
    frame_tx: mpsc::Sender<AdmittedFrame>,
    registry: Arc<AnalyzerRegistry>,
    metrics: Arc<PipelineMetrics>,
    monitor: Arc<PerformanceMonitor>,
    bottlenecks: Arc<BottleneckTracker>,
    quality: watch::Receiver<QualitySnapshot>,
    tasks: Vec<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl Coordinator {
    /// Offer one frame. Returns whether it was admitted; never blocks the caller.
    pub fn submit(&self, frame: Frame) -> bool {
        let admitted = match self.scheduler.submit(frame) {
            Admission::Accepted(admitted) => admitted,
            Admission::Rejected(_) => return false,
        };

        // Capacity one and a single in-flight slot: the channel is always empty here.
        match self.frame_tx.try_send(admitted) {
            Ok(()) => true,
            Err(e) => {
                // Dropping the frame releases its permit.
                warn!("Frame worker unavailable: {}", e);
                false
            }
        }
    }

    /// Pull frames from `source` until it ends or the coordinator shuts down.
    /// Returns the number of frames admitted.
    pub async fn run<S: FrameSource>(&self, mut source: S) -> u64 {
        let mut admitted = 0;
        let mut offered: u64 = 0;
        loop {
            let frame = tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                frame = source.next_frame() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            offered += 1;
            if self.submit(frame) {
                admitted += 1;
            }
        }
        info!("Frame source finished: {} offered, {} admitted", offered, admitted);
        admitted
    }

    pub fn is_busy(&self) -> bool {
        self.scheduler.is_in_flight()
    }

    pub fn quality(&self) -> QualitySnapshot {
        *self.quality.borrow()
    }

    pub fn registry(&self) -> &Arc<AnalyzerRegistry> {
        &self.registry
    }

    /// Enable or disable an analyzer while running. False if the type is not registered.
    pub fn set_analyzer_enabled(&self, analyzer_type: AnalyzerType, enabled: bool) -> bool {
        self.registry.set_enabled(analyzer_type, enabled)
    }

    pub fn performance(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::collect(
            &self.metrics,
            &self.monitor,
            &self.bottlenecks,
            self.quality(),
        )
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop both background tasks and wait for them to finish.
    pub async fn shutdown(mut self) -> Result<(), AppError> {
        self.cancel_token.cancel();
        for task in std::mem::take(&mut self.tasks) {
            task.await?;
        }
        info!("Coordinator stopped");
        Ok(())
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    consumer: Option<Arc<dyn ResultConsumer>>,
    probe: Option<Arc<dyn SystemProbe>>,
    analyzers: Vec<Box<dyn Analyzer>>,
    dispatch_mode: DispatchMode,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            consumer: None,
            probe: None,
            analyzers: Vec::new(),
            dispatch_mode: DispatchMode::Concurrent,
        }
    }

    // Receives every combined result. Defaults to a debug log line.
    pub fn consumer(mut self, consumer: Arc<dyn ResultConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    // Platform signal source, sampled every throttle tick.
    pub fn probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    // Use this analyzer instead of the built-in one for its type.
    pub fn analyzer(mut self, analyzer: Box<dyn Analyzer>) -> Self {
        self.analyzers.push(analyzer);
        self
    }

    pub fn dispatch_mode(mut self, dispatch_mode: DispatchMode) -> Self {
        self.dispatch_mode = dispatch_mode;
        self
    }

    fn build_registry(&mut self) -> AnalyzerRegistry {
        let mut registry = AnalyzerRegistry::new();
        for analyzer_type in AnalyzerType::ALL {
            let analyzer_config = self.configuration.analyzer_config(analyzer_type);
            let mut analyzer = match self
                .analyzers
                .iter()
                .position(|a| a.analyzer_type() == analyzer_type)
            {
                Some(index) => self.analyzers.remove(index),
                None => default_analyzer(analyzer_type),
            };
            analyzer.configure(&analyzer_config.settings);

            let priority = analyzer_config
                .priority
                .unwrap_or_else(|| analyzer_type.default_priority());
            registry = registry.register_with(analyzer, priority, analyzer_config.enabled);
        }
        registry
    }

    /// Wire everything together and spawn the worker and throttle tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(mut self) -> Result<Coordinator, AppError> {
        self.configuration.validate()?;
        let registry = Arc::new(self.build_registry());
        let configuration = self.configuration;

        let metrics = Arc::new(PipelineMetrics::new());
        let monitor = Arc::new(PerformanceMonitor::new(&configuration.monitor));
        let target_latency = configuration.monitor.target_latency();
        let bottlenecks = Arc::new(BottleneckTracker::new(target_latency, target_latency / 2));
        let observers: Arc<dyn MetricsObserver> = Arc::new(
            MetricsCollector::new()
                .add_observer(metrics.clone())
                .add_observer(monitor.clone())
                .add_observer(bottlenecks.clone()),
        );

        let (publisher, quality) = QualityPublisher::new(
            configuration.throttle.initial_level,
            configuration.quality.ceiling,
            configuration.quality.profiles,
        );
        let scheduler = Arc::new(FrameScheduler::new(quality.clone(), observers.clone()));

        let dispatcher = Dispatcher::new(registry.clone(), observers.clone())
            .with_deadline(configuration.scheduler.dispatch_deadline())
            .with_mode(self.dispatch_mode);
        let aggregator =
            Aggregator::new().with_deduplication(configuration.scheduler.deduplicate_suggestions);
        let processor = FrameProcessor::new(Arc::new(dispatcher), aggregator);

        let consumer = self.consumer.unwrap_or_else(|| {
            Arc::new(|result: CombinedResult| {
                debug!(
                    "Frame {}: confidence {:.2}, {} suggestions",
                    result.frame_id,
                    result.overall_confidence,
                    result.suggestions.len()
                );
            })
        });
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(SharedSystemSignals::new()));

        let cancel_token = CancellationToken::new();
        let (frame_tx, frame_rx) = mpsc::channel(1);
        let worker_task = tokio::spawn(run_worker(
            frame_rx,
            processor,
            consumer,
            observers,
            cancel_token.clone(),
        ));

        let throttle = ThrottleTask::new(
            ThrottleController::new(&configuration.throttle, target_latency),
            publisher,
            probe,
            monitor.clone(),
            configuration.throttle.tick_interval(),
        );
        let throttle_task = tokio::spawn(throttle.run(cancel_token.clone()));

        info!(
            "Coordinator started with {} analyzers at {} quality",
            registry.len(),
            quality.borrow().quality_level
        );

        Ok(Coordinator {
            scheduler,
            frame_tx,
            registry,
            metrics,
            monitor,
            bottlenecks,
            quality,
            tasks: vec![worker_task, throttle_task],
            cancel_token,
        })
    }
}
