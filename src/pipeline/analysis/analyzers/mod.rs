/// Concrete analyzers, one per analysis kind
pub mod composition;
pub mod exposure;
pub mod focus;
pub mod lighting;
pub mod stability;
pub mod subject;

pub use composition::CompositionAnalyzer;
pub use exposure::ExposureAnalyzer;
pub use focus::FocusAnalyzer;
pub use lighting::LightingAnalyzer;
pub use stability::StabilityAnalyzer;
pub use subject::SubjectAnalyzer;

use super::core::Analyzer;
use crate::pipeline::domain::AnalyzerType;
use image::GrayImage;

/// Recognised by every analyzer.
pub const CONFIDENCE_THRESHOLD_KEY: &str = "confidence_threshold";

/// Fresh, unconfigured analyzer for a type tag.
pub fn default_analyzer(analyzer_type: AnalyzerType) -> Box<dyn Analyzer> {
    match analyzer_type {
        AnalyzerType::Composition => Box::new(CompositionAnalyzer::new()),
        AnalyzerType::Lighting => Box::new(LightingAnalyzer::new()),
        AnalyzerType::Subject => Box::new(SubjectAnalyzer::new()),
        AnalyzerType::Focus => Box::new(FocusAnalyzer::new()),
        AnalyzerType::Exposure => Box::new(ExposureAnalyzer::new()),
        AnalyzerType::Stability => Box::new(StabilityAnalyzer::new()),
    }
}

/// Pixel stride so that roughly `target_samples` pixels are visited.
pub(crate) fn sample_step(width: u32, height: u32, target_samples: u32) -> u32 {
    let total = width as u64 * height as u64;
    if total <= target_samples as u64 || target_samples == 0 {
        return 1;
    }
    ((total as f64 / target_samples as f64).sqrt().floor() as u32).max(1)
}

/// Share of the wanted sample count actually seen, in `[0, 1]`.
pub(crate) fn coverage(samples: u64, wanted: u32) -> f32 {
    if wanted == 0 {
        return 1.0;
    }
    (samples as f32 / wanted as f32).min(1.0)
}

/// Absolute gradient (|dx| + |dy|) at an interior pixel.
pub(crate) fn gradient(luma: &GrayImage, x: u32, y: u32) -> u32 {
    let c = luma.get_pixel(x, y).0[0] as i32;
    let r = luma.get_pixel(x + 1, y).0[0] as i32;
    let d = luma.get_pixel(x, y + 1).0[0] as i32;
    ((r - c).abs() + (d - c).abs()) as u32
}

/// Edge energy summed per cell of a `cols` x `rows` grid.
pub(crate) fn edge_energy_grid(luma: &GrayImage, cols: u32, rows: u32, step: u32) -> Vec<u64> {
    let (width, height) = luma.dimensions();
    let mut cells = vec![0u64; (cols * rows) as usize];
    if width < 2 || height < 2 {
        return cells;
    }

    for y in (0..height - 1).step_by(step as usize) {
        let row = (y * rows / height).min(rows - 1);
        for x in (0..width - 1).step_by(step as usize) {
            let col = (x * cols / width).min(cols - 1);
            cells[(row * cols + col) as usize] += gradient(luma, x, y) as u64;
        }
    }
    cells
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_step_scales_with_image_size() {
        assert_eq!(sample_step(10, 10, 10_000), 1);
        assert_eq!(sample_step(400, 400, 10_000), 4);
        assert_eq!(sample_step(400, 400, 0), 1);
    }

    #[test]
    fn default_analyzers_report_their_type() {
        for analyzer_type in AnalyzerType::ALL {
            assert_eq!(default_analyzer(analyzer_type).analyzer_type(), analyzer_type);
        }
    }

    #[test]
    fn flat_image_has_no_edge_energy() {
        let frame = test_support::solid_frame(32, 32, [90, 90, 90]);
        let cells = edge_energy_grid(&frame.luma, 4, 4, 1);
        assert!(cells.iter().all(|e| *e == 0));
    }
}
