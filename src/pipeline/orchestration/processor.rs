use super::aggregator::Aggregator;
use super::dispatcher::Dispatcher;
use super::scheduler::AdmittedFrame;
use crate::common::Frame;
use crate::pipeline::domain::{CombinedResult, QualitySnapshot};
use crate::pipeline::monitoring::MetricsObserver;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn, Instrument};

/// Receives one combined result per processed frame, in admission order.
pub trait ResultConsumer: Send + Sync {
    fn on_result(&self, result: CombinedResult);
}

impl<F> ResultConsumer for F
where
    F: Fn(CombinedResult) + Send + Sync,
{
    fn on_result(&self, result: CombinedResult) {
        self(result)
    }
}

/// Forwards results into a bounded channel; a full channel drops the result.
pub struct ChannelConsumer {
    sender: mpsc::Sender<CombinedResult>,
}

impl ChannelConsumer {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CombinedResult>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl ResultConsumer for ChannelConsumer {
    fn on_result(&self, result: CombinedResult) {
        match self.sender.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Full(result)) => {
                warn!(
                    "Result consumer is lagging, dropping result for frame {}",
                    result.frame_id
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Result consumer has gone away");
            }
        }
    }
}

/// One admitted frame and the quality it was admitted under.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub frame: Frame,
    pub quality: QualitySnapshot,
}

/// Dispatch then aggregate, as a tower service.
///
/// Never fails: a frame whose analyzers all failed still yields an empty result.
#[derive(Clone)]
pub struct FrameProcessor {
    dispatcher: Arc<Dispatcher>,
    aggregator: Aggregator,
}

impl FrameProcessor {
    pub fn new(dispatcher: Arc<Dispatcher>, aggregator: Aggregator) -> Self {
        Self {
            dispatcher,
            aggregator,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub async fn process(&self, frame: &Frame, quality: QualitySnapshot) -> CombinedResult {
        let started = Instant::now();
        let results = self.dispatcher.dispatch(frame, &quality).await;
        let mut combined = self
            .aggregator
            .aggregate(frame.frame_id(), quality.quality_level, results);
        combined.processing_time_us = started.elapsed().as_micros() as u64;
        combined
    }
}

impl Service<FrameRequest> for FrameProcessor {
    type Response = CombinedResult;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: FrameRequest) -> Self::Future {
        let processor = self.clone();
        let span = tracing::debug_span!(
            "process_frame",
            frame_id = %request.frame.frame_id(),
            quality = %request.quality.quality_level
        );

        Box::pin(
            async move { Ok(processor.process(&request.frame, request.quality).await) }
                .instrument(span),
        )
    }
}

/// Worker loop: process each admitted frame, deliver its result, then free the in-flight slot.
pub async fn run_worker(
    mut frames: mpsc::Receiver<AdmittedFrame>,
    processor: FrameProcessor,
    consumer: Arc<dyn ResultConsumer>,
    metrics: Arc<dyn MetricsObserver>,
    cancel_token: CancellationToken,
) {
    loop {
        let admitted = tokio::select! {
            _ = cancel_token.cancelled() => break,
            admitted = frames.recv() => match admitted {
                Some(admitted) => admitted,
                None => break,
            },
        };

        let (frame, quality, permit) = admitted.into_parts();
        let started = Instant::now();
        let combined = match processor.clone().oneshot(FrameRequest { frame, quality }).await {
            Ok(combined) => combined,
            Err(never) => match never {},
        };

        metrics.on_frame_processed(&combined, started.elapsed());
        consumer.on_result(combined);
        drop(permit);
    }
    info!("Frame worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::registry::tests::FixedAnalyzer;
    use crate::pipeline::analysis::AnalyzerRegistry;
    use crate::pipeline::domain::{AnalyzerType, QualityLevel, QualityProfiles, ThrottleLevel};
    use crate::pipeline::monitoring::PipelineMetrics;
    use crate::pipeline::orchestration::scheduler::{Admission, FrameScheduler};
    use chrono::{TimeDelta, Utc};
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::sync::Mutex;
    use tokio::sync::watch;

    fn frame() -> Frame {
        Frame::new(
            DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(
                16,
                16,
                Rgb([40, 40, 40]),
            )),
            Utc::now(),
        )
    }

    fn quality() -> QualitySnapshot {
        QualitySnapshot::resolve(
            ThrottleLevel::None,
            QualityLevel::High,
            &QualityProfiles::default(),
        )
    }

    fn processor(metrics: Arc<PipelineMetrics>) -> FrameProcessor {
        let registry = AnalyzerRegistry::new()
            .register(Box::new(FixedAnalyzer {
                analyzer_type: AnalyzerType::Focus,
                confidence: 0.8,
            }))
            .register(Box::new(FixedAnalyzer {
                analyzer_type: AnalyzerType::Exposure,
                confidence: 0.4,
            }));
        let dispatcher = Dispatcher::new(Arc::new(registry), metrics);
        FrameProcessor::new(Arc::new(dispatcher), Aggregator::new())
    }

    #[tokio::test]
    async fn service_produces_combined_result() {
        let mut service = processor(Arc::new(PipelineMetrics::new()));
        let frame = frame();
        let frame_id = frame.frame_id();

        let combined = service
            .ready()
            .await
            .unwrap()
            .call(FrameRequest {
                frame,
                quality: quality(),
            })
            .await
            .unwrap();

        assert_eq!(combined.frame_id, frame_id);
        assert_eq!(combined.results.len(), 2);
        assert!((combined.overall_confidence - 0.6).abs() < 1e-6);
        assert_eq!(combined.quality_level, QualityLevel::High);
    }

    #[tokio::test]
    async fn channel_consumer_drops_when_full() {
        let (consumer, mut receiver) = ChannelConsumer::new(1);
        let aggregator = Aggregator::new();
        for _ in 0..2 {
            let empty = aggregator.aggregate(uuid::Uuid::new_v4(), QualityLevel::Low, Vec::new());
            consumer.on_result(empty);
        }

        assert!(receiver.recv().await.is_some());
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn worker_delivers_in_order_and_releases_the_slot() {
        let metrics = Arc::new(PipelineMetrics::new());
        let (_quality_tx, quality_rx) = watch::channel(quality());
        let scheduler = FrameScheduler::new(quality_rx, metrics.clone());

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        let consumer: Arc<dyn ResultConsumer> = Arc::new(move |result: CombinedResult| {
            sink.lock().unwrap().push(result.frame_id);
        });

        let (tx, rx) = mpsc::channel(1);
        let cancel_token = CancellationToken::new();
        let worker = tokio::spawn(run_worker(
            rx,
            processor(metrics.clone()),
            consumer,
            metrics.clone(),
            cancel_token.clone(),
        ));

        let base = Utc::now();
        let mut expected = Vec::new();
        for i in 0..3 {
            let frame = Frame::new(frame().image().clone(), base + TimeDelta::seconds(i));
            let Admission::Accepted(admitted) = scheduler.submit(frame) else {
                panic!("frame {i} should be admitted");
            };
            expected.push(admitted.frame().frame_id());
            tx.send(admitted).await.unwrap();

            // Wait for delivery, which frees the slot.
            while scheduler.is_in_flight() {
                tokio::task::yield_now().await;
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        }

        cancel_token.cancel();
        worker.await.unwrap();

        assert_eq!(*delivered.lock().unwrap(), expected);
        assert_eq!(metrics.frames_processed(), 3);
        assert_eq!(metrics.frames_dropped(), 0);
    }
}
