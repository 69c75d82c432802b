use crate::common::Frame;
use crate::pipeline::domain::QualitySnapshot;
use crate::pipeline::monitoring::MetricsObserver;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// Why the scheduler turned a frame away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No pixel data.
    InvalidFrame,
    /// The previous frame has not been delivered yet.
    InFlight,
    /// Arrived before the current target interval elapsed.
    TooSoon,
    /// Captured before the last accepted frame.
    Stale,
}

impl DropReason {
    pub fn name(&self) -> &'static str {
        match self {
            DropReason::InvalidFrame => "invalid_frame",
            DropReason::InFlight => "in_flight",
            DropReason::TooSoon => "too_soon",
            DropReason::Stale => "stale",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Holds the single in-flight slot; dropping it lets the next frame in.
#[derive(Debug)]
pub struct InFlightPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A frame that passed admission, with the quality snapshot it will be processed under.
#[derive(Debug)]
pub struct AdmittedFrame {
    frame: Frame,
    quality: QualitySnapshot,
    permit: InFlightPermit,
}

impl AdmittedFrame {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn quality(&self) -> QualitySnapshot {
        self.quality
    }

    /// Split off the permit so it can outlive processing until the result is delivered.
    pub fn into_parts(self) -> (Frame, QualitySnapshot, InFlightPermit) {
        (self.frame, self.quality, self.permit)
    }
}

#[derive(Debug)]
pub enum Admission {
    Accepted(AdmittedFrame),
    Rejected(DropReason),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted(_))
    }
}

/// Admission-control gate in front of the dispatcher.
///
/// Accepts a frame only when nothing is in flight and the frame's capture time
/// is at least the current target interval after the last accepted frame.
/// Rejections are counted and otherwise forgotten; nothing is queued.
pub struct FrameScheduler {
    quality: watch::Receiver<QualitySnapshot>,
    in_flight: Arc<AtomicBool>,
    last_accepted: Mutex<Option<DateTime<Utc>>>,
    accepted: AtomicU64,
    dropped: AtomicU64,
    metrics: Arc<dyn MetricsObserver>,
}

impl FrameScheduler {
    pub fn new(
        quality: watch::Receiver<QualitySnapshot>,
        metrics: Arc<dyn MetricsObserver>,
    ) -> Self {
        Self {
            quality,
            in_flight: Arc::new(AtomicBool::new(false)),
            last_accepted: Mutex::new(None),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn submit(&self, frame: Frame) -> Admission {
        match self.admit(&frame) {
            Ok(quality) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                let permit = InFlightPermit {
                    flag: Arc::clone(&self.in_flight),
                };
                Admission::Accepted(AdmittedFrame {
                    frame,
                    quality,
                    permit,
                })
            }
            Err(reason) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Dropped frame {}: {}", frame.frame_id(), reason);
                self.metrics.on_frame_dropped(reason);
                Admission::Rejected(reason)
            }
        }
    }

    fn admit(&self, frame: &Frame) -> Result<QualitySnapshot, DropReason> {
        if !frame.is_usable() {
            return Err(DropReason::InvalidFrame);
        }

        // The flag is only ever raised under this lock, so check-then-set is race free.
        let mut last_accepted = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.in_flight.load(Ordering::Acquire) {
            return Err(DropReason::InFlight);
        }

        let quality = *self.quality.borrow();
        let captured_at = frame.captured_at();
        if let Some(last) = *last_accepted {
            let elapsed = captured_at - last;
            if elapsed < TimeDelta::zero() {
                return Err(DropReason::Stale);
            }
            let interval = TimeDelta::milliseconds(quality.profile.target_interval_ms as i64);
            if elapsed < interval {
                return Err(DropReason::TooSoon);
            }
        }

        self.in_flight.store(true, Ordering::Release);
        *last_accepted = Some(captured_at);
        Ok(quality)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn current_quality(&self) -> QualitySnapshot {
        *self.quality.borrow()
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::domain::{QualityLevel, QualityProfiles, ThrottleLevel};
    use crate::pipeline::monitoring::PipelineMetrics;
    use chrono::TimeZone;
    use image::{DynamicImage, ImageBuffer, Rgb};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn frame_at(ms: i64) -> Frame {
        Frame::new(
            DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(
                8,
                8,
                Rgb([1, 2, 3]),
            )),
            at(ms),
        )
    }

    fn snapshot(throttle: ThrottleLevel) -> QualitySnapshot {
        QualitySnapshot::resolve(throttle, QualityLevel::High, &QualityProfiles::default())
    }

    fn scheduler() -> (
        FrameScheduler,
        watch::Sender<QualitySnapshot>,
        Arc<PipelineMetrics>,
    ) {
        let (tx, rx) = watch::channel(snapshot(ThrottleLevel::None));
        let metrics = Arc::new(PipelineMetrics::new());
        (FrameScheduler::new(rx, metrics.clone()), tx, metrics)
    }

    fn accept(admission: Admission) -> AdmittedFrame {
        match admission {
            Admission::Accepted(admitted) => admitted,
            Admission::Rejected(reason) => panic!("expected acceptance, got {reason}"),
        }
    }

    #[test]
    fn frames_inside_the_target_interval_are_dropped() {
        let (scheduler, _tx, metrics) = scheduler();
        // High quality: 33ms target interval.
        drop(accept(scheduler.submit(frame_at(0))));

        assert!(matches!(
            scheduler.submit(frame_at(20)),
            Admission::Rejected(DropReason::TooSoon)
        ));
        assert_eq!(scheduler.dropped_count(), 1);
        assert_eq!(metrics.dropped_by_reason(DropReason::TooSoon), 1);

        assert!(scheduler.submit(frame_at(40)).is_accepted());
        assert_eq!(scheduler.accepted_count(), 2);
    }

    #[test]
    fn in_flight_frame_blocks_regardless_of_timestamp() {
        let (scheduler, _tx, metrics) = scheduler();
        let first = accept(scheduler.submit(frame_at(0)));
        assert!(scheduler.is_in_flight());

        assert!(matches!(
            scheduler.submit(frame_at(10_000)),
            Admission::Rejected(DropReason::InFlight)
        ));
        assert_eq!(metrics.frames_dropped(), 1);

        let (_frame, _quality, permit) = first.into_parts();
        drop(permit);
        assert!(!scheduler.is_in_flight());
        assert!(scheduler.submit(frame_at(10_000)).is_accepted());
    }

    #[test]
    fn target_interval_follows_published_quality() {
        let (scheduler, tx, _metrics) = scheduler();
        drop(accept(scheduler.submit(frame_at(0))));

        // Aggressive throttle resolves to the minimal profile: 250ms.
        tx.send_replace(snapshot(ThrottleLevel::Aggressive));
        assert!(matches!(
            scheduler.submit(frame_at(100)),
            Admission::Rejected(DropReason::TooSoon)
        ));
        let admitted = accept(scheduler.submit(frame_at(260)));
        assert_eq!(admitted.quality().quality_level, QualityLevel::Minimal);
    }

    #[test]
    fn older_timestamps_are_stale() {
        let (scheduler, _tx, metrics) = scheduler();
        drop(accept(scheduler.submit(frame_at(1_000))));
        assert!(matches!(
            scheduler.submit(frame_at(500)),
            Admission::Rejected(DropReason::Stale)
        ));
        assert_eq!(metrics.dropped_by_reason(DropReason::Stale), 1);
    }

    #[test]
    fn empty_frames_are_rejected_before_anything_else() {
        let (scheduler, _tx, metrics) = scheduler();
        let empty = Frame::new(DynamicImage::new_rgb8(0, 0), at(0));
        assert!(matches!(
            scheduler.submit(empty),
            Admission::Rejected(DropReason::InvalidFrame)
        ));
        assert!(!scheduler.is_in_flight());
        assert_eq!(metrics.dropped_by_reason(DropReason::InvalidFrame), 1);
        assert!(scheduler.submit(frame_at(0)).is_accepted());
    }
}
