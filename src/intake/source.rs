use crate::common::Frame;
use async_trait::async_trait;
use chrono::Utc;
use image::{DynamicImage, ImageBuffer, Rgb};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

/// Pull side of the camera session. `None` means the session has ended.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Option<Frame>;
}

/// Adapts a push-style camera callback: the capture thread sends, the pipeline pulls.
pub struct ChannelFrameSource {
    receiver: mpsc::Receiver<Frame>,
}

impl ChannelFrameSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn next_frame(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }
}

/// Generates frames at a fixed cadence: a bright square drifting over a noisy
/// gradient, with an occasional jolt so the stability analyzer has something to see.
pub struct SyntheticCamera {
    ticks: IntervalStream,
    width: u32,
    height: u32,
    rng: StdRng,
    produced: u64,
    limit: Option<u64>,
}

impl SyntheticCamera {
    pub fn new(fps: u32, width: u32, height: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticks: IntervalStream::new(ticks),
            width: width.max(1),
            height: height.max(1),
            rng: StdRng::from_os_rng(),
            produced: 0,
            limit: None,
        }
    }

    /// End the session after `frames` captures.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn render(&mut self) -> DynamicImage {
        let (width, height) = (self.width, self.height);
        let side = (width.min(height) / 4).max(1);
        let travel = width.saturating_sub(side).max(1);
        let mut x0 = (self.produced as u32).wrapping_mul(2) % travel;
        let mut y0 = height.saturating_sub(side) / 2;
        if self.rng.random_bool(0.1) {
            x0 = (x0 + self.rng.random_range(0..=side)) % travel;
            y0 = y0.saturating_sub(self.rng.random_range(0..=side / 2));
        }

        let noise: Vec<i16> = (0..width * height)
            .map(|_| self.rng.random_range(-6..=6))
            .collect();

        let image = ImageBuffer::from_fn(width, height, |x, y| {
            let inside = x >= x0 && x < x0 + side && y >= y0 && y < y0 + side;
            let base: i16 = if inside {
                220
            } else {
                40 + (90 * y / height) as i16
            };
            let value = (base + noise[(y * width + x) as usize]).clamp(0, 255) as u8;
            Rgb([value, value, value.saturating_sub(8)])
        });
        DynamicImage::ImageRgb8(image)
    }
}

#[async_trait]
impl FrameSource for SyntheticCamera {
    async fn next_frame(&mut self) -> Option<Frame> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return None;
        }
        self.ticks.next().await?;
        let image = self.render();
        self.produced += 1;
        Some(Frame::new(image, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_source_ends_when_senders_drop() {
        let (sender, mut source) = ChannelFrameSource::new(2);
        let frame = Frame::new(DynamicImage::new_rgb8(4, 4), Utc::now());
        let frame_id = frame.frame_id();
        sender.send(frame).await.unwrap();
        drop(sender);

        assert_eq!(source.next_frame().await.map(|f| f.frame_id()), Some(frame_id));
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn synthetic_camera_honours_limit_and_size() {
        let mut camera = SyntheticCamera::new(200, 32, 24).with_seed(7).with_limit(3);
        let mut frames = Vec::new();
        while let Some(frame) = camera.next_frame().await {
            frames.push(frame);
        }

        assert_eq!(frames.len(), 3);
        assert_eq!(camera.produced(), 3);
        assert!(frames.iter().all(|f| f.dimensions() == (32, 24) && f.is_usable()));
        assert!(frames
            .windows(2)
            .all(|pair| pair[0].captured_at() <= pair[1].captured_at()));
    }
}
