use crate::common::AnalyzerSettings;
use crate::error::AnalyzerError;
use crate::pipeline::domain::{AnalysisResult, AnalyzerType};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, RgbImage};
use std::sync::Arc;
use uuid::Uuid;

/// `Ok(None)` means "nothing usable this frame" and is not a failure.
pub type AnalyzerOutput = Result<Option<AnalysisResult>, AnalyzerError>;

/// Preprocessed view of one frame shared by every analyzer that runs on it
#[derive(Clone)]
pub struct AnalysisFrame {
    pub frame_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub image: Arc<DynamicImage>,
    pub rgb: Arc<RgbImage>,
    pub luma: Arc<GrayImage>,
    pub dimensions: (u32, u32),
    pub downsample_factor: u32,
}

impl AnalysisFrame {
    pub fn new(
        frame_id: Uuid,
        captured_at: DateTime<Utc>,
        image: DynamicImage,
        downsample_factor: u32,
    ) -> Self {
        Self::from_shared(frame_id, captured_at, Arc::new(image), downsample_factor)
    }

    /// Build from an image already shared with the capture side, without copying it.
    pub fn from_shared(
        frame_id: Uuid,
        captured_at: DateTime<Utc>,
        image: Arc<DynamicImage>,
        downsample_factor: u32,
    ) -> Self {
        let rgb = Arc::new(image.to_rgb8());
        let luma = Arc::new(image.to_luma8());
        let dimensions = rgb.dimensions();

        Self {
            frame_id,
            captured_at,
            image,
            rgb,
            luma,
            dimensions,
            downsample_factor: downsample_factor.max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    pub fn pixel_count(&self) -> u64 {
        self.dimensions.0 as u64 * self.dimensions.1 as u64
    }
}

/// Rectangular region of an image for focused analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ImageRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full_image(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn center_half(width: u32, height: u32) -> Self {
        Self::new(width / 4, height / 4, width / 2, height / 2)
    }

    /// Cell `(col, row)` of a `cols` x `rows` grid laid over the image.
    pub fn grid_cell(width: u32, height: u32, cols: u32, rows: u32, col: u32, row: u32) -> Self {
        let x0 = width * col / cols;
        let x1 = width * (col + 1) / cols;
        let y0 = height * row / rows;
        let y1 = height * (row + 1) / rows;
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    /// Center in normalized image coordinates.
    pub fn normalized_center(&self, width: u32, height: u32) -> (f32, f32) {
        (
            (self.x as f32 + self.width as f32 / 2.0) / width.max(1) as f32,
            (self.y as f32 + self.height as f32 / 2.0) / height.max(1) as f32,
        )
    }
}

/// Uniform contract for every analysis kind.
///
/// `analyze` may update the analyzer's own private history but never touches
/// pipeline state. It is called from a blocking worker thread, so it is free to
/// do plain CPU work.
pub trait Analyzer: Send + Sync {
    fn analyzer_type(&self) -> AnalyzerType;

    fn name(&self) -> &'static str;

    /// Apply recognised keys from `settings`; unknown keys are ignored.
    fn configure(&mut self, settings: &AnalyzerSettings);

    fn analyze(&self, frame: &AnalysisFrame) -> AnalyzerOutput;
}

/// Drop a result whose confidence is below the analyzer's threshold.
pub fn gate_confidence(result: AnalysisResult, threshold: f32) -> Option<AnalysisResult> {
    if result.confidence >= threshold {
        Some(result)
    } else {
        None
    }
}
