use crate::common::Frame;
use crate::pipeline::analysis::AnalysisFrame;
use image::imageops::FilterType;
use std::sync::Arc;

/// Downsample a frame once and derive the RGB and luma planes every analyzer reads.
///
/// A factor of 1 shares the captured image as-is. Larger factors shrink both
/// sides, never below one pixel.
pub fn prepare(frame: &Frame, downsample_factor: u32) -> AnalysisFrame {
    let factor = downsample_factor.max(1);
    let (width, height) = frame.dimensions();

    let image = if factor == 1 {
        frame.shared_image()
    } else {
        let target_width = (width / factor).max(1);
        let target_height = (height / factor).max(1);
        Arc::new(
            frame
                .image()
                .resize_exact(target_width, target_height, FilterType::Triangle),
        )
    };

    AnalysisFrame::from_shared(frame.frame_id(), frame.captured_at(), image, factor)
}
