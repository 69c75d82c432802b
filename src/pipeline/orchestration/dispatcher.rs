use super::preprocessing;
use crate::common::Frame;
use crate::pipeline::analysis::{AnalysisFrame, Analyzer, AnalyzerRegistry};
use crate::pipeline::domain::{AnalysisResult, AnalyzerType, QualitySnapshot};
use crate::pipeline::monitoring::MetricsObserver;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// What happened when one analyzer ran against one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerOutcome {
    Produced(AnalysisResult),
    /// Ran fine but had nothing usable to say.
    Empty,
    Failed(String),
    /// Still running when the dispatch deadline passed; its result is ignored.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerReport {
    pub analyzer_type: AnalyzerType,
    pub outcome: AnalyzerOutcome,
    pub elapsed: Duration,
}

impl AnalyzerReport {
    pub fn into_result(self) -> Option<AnalysisResult> {
        match self.outcome {
            AnalyzerOutcome::Produced(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One blocking task per analyzer, all awaited up to the deadline.
    Concurrent,
    /// In-line, in priority order; analyzers not started by the deadline are skipped.
    Sequential,
}

/// Runs the analyzer budget for one frame and isolates every analyzer's failure.
pub struct Dispatcher {
    registry: Arc<AnalyzerRegistry>,
    metrics: Arc<dyn MetricsObserver>,
    deadline: Duration,
    mode: DispatchMode,
}

impl Dispatcher {
    pub fn new(registry: Arc<AnalyzerRegistry>, metrics: Arc<dyn MetricsObserver>) -> Self {
        Self {
            registry,
            metrics,
            deadline: Duration::from_millis(250),
            mode: DispatchMode::Concurrent,
        }
    }

    /// Soft outer deadline for one frame's analyzers.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn registry(&self) -> &Arc<AnalyzerRegistry> {
        &self.registry
    }

    /// Enabled analyzers for this quality snapshot, best first, never more than its budget.
    pub fn select(&self, quality: &QualitySnapshot) -> Vec<(AnalyzerType, Arc<dyn Analyzer>)> {
        let budget = quality.profile.analyzer_budget(self.registry.len());
        self.registry.select(budget)
    }

    /// Preprocess once, run the selected analyzers and return the results that came back.
    pub async fn dispatch(&self, frame: &Frame, quality: &QualitySnapshot) -> Vec<AnalysisResult> {
        let prepared = preprocessing::prepare(frame, quality.profile.downsample_factor);
        self.run(Arc::new(prepared), quality)
            .await
            .into_iter()
            .filter_map(AnalyzerReport::into_result)
            .collect()
    }

    /// Run the selection against an already prepared frame, reporting every analyzer's outcome.
    ///
    /// Reports come back in selection order whatever order the analyzers finished in.
    pub async fn run(
        &self,
        frame: Arc<AnalysisFrame>,
        quality: &QualitySnapshot,
    ) -> Vec<AnalyzerReport> {
        let selected = self.select(quality);
        if selected.is_empty() {
            warn!(
                "No enabled analyzers; frame {} yields an empty result",
                frame.frame_id
            );
            return Vec::new();
        }
        let order: Vec<AnalyzerType> = selected.iter().map(|(t, _)| *t).collect();

        let mut reports = match self.mode {
            DispatchMode::Concurrent => self.run_concurrent(selected, frame).await,
            DispatchMode::Sequential => self.run_sequential(selected, &frame),
        };
        reports.sort_by_key(|r| order.iter().position(|t| *t == r.analyzer_type));

        for report in &reports {
            match &report.outcome {
                AnalyzerOutcome::Failed(reason) => {
                    debug!("{} analyzer failed: {}", report.analyzer_type, reason)
                }
                AnalyzerOutcome::TimedOut => {
                    debug!("{} analyzer timed out", report.analyzer_type)
                }
                _ => {}
            }
            self.metrics.on_analyzer_finished(report);
        }
        reports
    }

    async fn run_concurrent(
        &self,
        selected: Vec<(AnalyzerType, Arc<dyn Analyzer>)>,
        frame: Arc<AnalysisFrame>,
    ) -> Vec<AnalyzerReport> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut pending: Vec<AnalyzerType> = selected.iter().map(|(t, _)| *t).collect();
        let mut reports = Vec::with_capacity(selected.len());

        let mut tasks = JoinSet::new();
        for (analyzer_type, analyzer) in selected {
            let frame = Arc::clone(&frame);
            tasks.spawn_blocking(move || run_analyzer(analyzer_type, analyzer.as_ref(), &frame));
        }

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(report))) => {
                    pending.retain(|t| *t != report.analyzer_type);
                    reports.push(report);
                }
                Ok(Some(Err(e))) => {
                    warn!("Analyzer task did not complete: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    // Blocking tasks cannot be interrupted; whatever they return is discarded.
                    tasks.abort_all();
                    let elapsed = started.elapsed();
                    reports.extend(pending.drain(..).map(|analyzer_type| AnalyzerReport {
                        analyzer_type,
                        outcome: AnalyzerOutcome::TimedOut,
                        elapsed,
                    }));
                    break;
                }
            }
        }

        // Anything still pending lost its task without reporting.
        reports.extend(pending.into_iter().map(|analyzer_type| AnalyzerReport {
            analyzer_type,
            outcome: AnalyzerOutcome::Failed("analyzer task was lost".to_string()),
            elapsed: started.elapsed(),
        }));
        reports
    }

    fn run_sequential(
        &self,
        selected: Vec<(AnalyzerType, Arc<dyn Analyzer>)>,
        frame: &AnalysisFrame,
    ) -> Vec<AnalyzerReport> {
        let started = Instant::now();
        selected
            .into_iter()
            .map(|(analyzer_type, analyzer)| {
                if started.elapsed() >= self.deadline {
                    AnalyzerReport {
                        analyzer_type,
                        outcome: AnalyzerOutcome::TimedOut,
                        elapsed: Duration::ZERO,
                    }
                } else {
                    run_analyzer(analyzer_type, analyzer.as_ref(), frame)
                }
            })
            .collect()
    }
}

/// Invoke one analyzer, turning errors and panics into outcomes.
fn run_analyzer(
    analyzer_type: AnalyzerType,
    analyzer: &dyn Analyzer,
    frame: &AnalysisFrame,
) -> AnalyzerReport {
    let started = Instant::now();
    let outcome = match catch_unwind(AssertUnwindSafe(|| analyzer.analyze(frame))) {
        Ok(Ok(Some(result))) if result.analyzer_type != analyzer_type => {
            AnalyzerOutcome::Failed(format!(
                "{} returned a {} result",
                analyzer.name(),
                result.analyzer_type
            ))
        }
        // Also catches NaN.
        Ok(Ok(Some(result))) if !(0.0..=1.0).contains(&result.confidence) => {
            AnalyzerOutcome::Failed(format!(
                "{} reported confidence {} outside [0, 1]",
                analyzer.name(),
                result.confidence
            ))
        }
        Ok(Ok(Some(result))) => AnalyzerOutcome::Produced(result),
        Ok(Ok(None)) => AnalyzerOutcome::Empty,
        Ok(Err(e)) => AnalyzerOutcome::Failed(e.to_string()),
        Err(_) => AnalyzerOutcome::Failed(format!("{} panicked", analyzer.name())),
    };

    AnalyzerReport {
        analyzer_type,
        outcome,
        elapsed: started.elapsed(),
    }
}
