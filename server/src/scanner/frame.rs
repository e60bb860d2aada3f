use std::io::Cursor;

use image::{GrayImage, ImageReader, Limits};

/// Largest accepted photo side, in pixels.
pub const MAX_FRAME_SIDE: u32 = 4096;
/// Decoder allocation ceiling; fits one RGBA frame at the maximum size.
const MAX_DECODE_ALLOC: u64 = 80 * 1024 * 1024;

/// One 8-bit grayscale camera frame, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub luma: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, luma: Vec<u8>) -> Self {
        Self {
            width,
            height,
            luma,
        }
    }

    pub fn from_gray(image: &GrayImage) -> Self {
        Self::new(
            image.width() as usize,
            image.height() as usize,
            image.as_raw().clone(),
        )
    }

    /// Decodes an encoded photo (PNG, JPEG) into a grayscale frame.
    ///
    /// Dimensions are checked from the header before any pixel buffer is
    /// allocated; larger images fail with [`image::ImageError::Limits`].
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_FRAME_SIDE);
        limits.max_image_height = Some(MAX_FRAME_SIDE);
        limits.max_alloc = Some(MAX_DECODE_ALLOC);

        let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        reader.limits(limits);
        let image = reader.decode()?.into_luma8();
        Ok(Self::from_gray(&image))
    }

    fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.luma.len() >= self.width * self.height
    }
}

/// Returns the text of the first QR code found in the frame.
///
/// Frames without a readable code are the common case and yield `None`.
pub fn decode_frame(frame: &Frame) -> Option<String> {
    if !frame.is_well_formed() {
        return None;
    }
    let width = frame.width;
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(frame.width, frame.height, |x, y| {
            frame.luma[y * width + x]
        });
    prepared
        .detect_grids()
        .into_iter()
        .find_map(|grid| grid.decode().ok().map(|(_, content)| content))
}
