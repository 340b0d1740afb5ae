//! The source image borrowed by a pipeline (spec.md §3 "Image", §6 input format).
//!
//! Decoding, ICC profile loading and so on are external collaborators (spec.md
//! §1); this module only models the data the pipeline is handed.

use crate::descriptor::Filters;

/// Orientation as stored by the camera/EXIF; the pipeline does not interpret
/// it beyond passing it through to callers that need to rotate the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    FlipHorizontal,
    FlipVertical,
}

/// Per-sample storage of the mosaic or RGB source.
#[derive(Debug, Clone)]
pub enum SourceData {
    /// 16-bit unsigned mosaic samples, one per pixel, row-major.
    Mosaic16(Vec<u16>),
    /// float32 mosaic samples, one per pixel, row-major.
    MosaicF32(Vec<f32>),
    /// Non-mosaic float RGB, three samples per pixel, row-major.
    Rgb(Vec<f32>),
}

/// Borrowed, immutable source image (spec.md §3). Never mutated by the
/// pipeline; `Pipeline::create` only reads it.
#[derive(Debug, Clone)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: SourceData,
    pub filters: Filters,
    pub raw_white_point: f32,
    pub as_shot_wb: [f32; 4],
    /// Row-major 3x3 camera-to-XYZ colour matrix.
    pub camera_matrix: [[f32; 3]; 3],
    pub orientation: Orientation,
    pub monochrome: bool,
}

impl Image {
    pub fn is_mosaic(&self) -> bool {
        !matches!(self.filters, Filters::None)
    }

    /// Total pixel count, used to size working buffers.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("image has zero width or height".into());
        }
        let expected = self.pixel_count();
        let actual = match &self.data {
            SourceData::Mosaic16(v) => v.len(),
            SourceData::MosaicF32(v) => v.len(),
            SourceData::Rgb(v) => v.len() / 3,
        };
        if actual != expected {
            return Err(format!(
                "pixel data length {} does not match {}x{} = {}",
                actual, self.width, self.height, expected
            ));
        }
        Ok(())
    }
}
