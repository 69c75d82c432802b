use crate::error::FrameError;
use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use uuid::Uuid;

/// One camera capture. Cheap to clone, the pixel buffer is shared.
#[derive(Clone)]
pub struct Frame {
    frame_id: Uuid,
    image: Arc<DynamicImage>,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: DynamicImage, captured_at: DateTime<Utc>) -> Self {
        Self {
            frame_id: Uuid::new_v4(),
            image: Arc::new(image),
            captured_at,
        }
    }

    /// Build a frame from a packed RGB8 buffer as delivered by the camera session.
    pub fn from_rgb(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyImage { width, height });
        }
        let actual = pixels.len();
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3))
            .ok_or(FrameError::BufferSize {
                expected: usize::MAX,
                actual,
            })?;
        let rgb = RgbImage::from_raw(width, height, pixels)
            .ok_or(FrameError::BufferSize { expected, actual })?;
        Ok(Self::new(DynamicImage::ImageRgb8(rgb), captured_at))
    }

    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn shared_image(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.image)
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// A frame without pixels is an acquisition failure and is never dispatched.
    pub fn is_usable(&self) -> bool {
        let (width, height) = self.dimensions();
        width > 0 && height > 0
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("Frame")
            .field("frame_id", &self.frame_id)
            .field("captured_at", &self.captured_at)
            .field("width", &width)
            .field("height", &height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn cloning_frame_shares_image_buffer() {
        let img: DynamicImage = DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(16, 16, Rgb([1, 2, 3])),
        );
        let f1 = Frame::new(img, Utc::now());
        let f2 = f1.clone();
        assert!(Arc::ptr_eq(&f1.image, &f2.image));
        assert_eq!(f1.frame_id(), f2.frame_id());
    }

    #[test]
    fn from_rgb_rejects_short_buffers() {
        let result = Frame::from_rgb(4, 4, vec![0; 10], Utc::now());
        assert_eq!(
            result.unwrap_err(),
            FrameError::BufferSize {
                expected: 48,
                actual: 10
            }
        );
    }

    #[test]
    fn from_rgb_rejects_empty_dimensions() {
        let result = Frame::from_rgb(0, 4, Vec::new(), Utc::now());
        assert!(matches!(result, Err(FrameError::EmptyImage { .. })));
    }

    #[test]
    fn empty_image_is_not_usable() {
        let frame = Frame::new(DynamicImage::new_rgb8(0, 0), Utc::now());
        assert!(!frame.is_usable());
    }

    #[test]
    fn from_rgb_rejects_dimensions_that_overflow_the_buffer_size() {
        let result = Frame::from_rgb(u32::MAX, u32::MAX, vec![0; 3], Utc::now());
        assert!(matches!(
            result,
            Err(FrameError::BufferSize { actual: 3, .. })
        ));
    }
}
