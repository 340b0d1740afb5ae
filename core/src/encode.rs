//! Linear-to-sRGB conversion and 8-bit quantisation of the final backbuffer
//! (spec.md §4.10, C10).

/// `RenderedResult` as returned by `render`/`render_region` (spec.md §4.9,
/// §6): tightly packed 8-bit sRGB RGBA, row-major, top-left origin, no row
/// padding (`stride == 4 * width`).
#[derive(Debug, Clone)]
pub struct RenderedResult {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl RenderedResult {
    pub fn empty() -> Self {
        RenderedResult {
            pixels: Vec::new(),
            width: 0,
            height: 0,
            stride: 0,
        }
    }
}

/// sRGB OETF on one linear channel in `[0, 1]` (spec.md §4.10).
fn srgb_encode(x: f32) -> f32 {
    if x <= 0.0 {
        0.0
    } else if x >= 1.0 {
        1.0
    } else if x <= 0.003_130_8 {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

fn quantize(x: f32) -> u8 {
    (x * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Encodes a linear float-RGBA backbuffer (as laid out by [`PixelBuffer`])
/// into the tightly packed 8-bit sRGB RGBA output format. Alpha is clamped
/// and quantised but not gamma-encoded (spec.md §4.10).
///
/// [`PixelBuffer`]: crate::buffer::PixelBuffer
pub fn encode_backbuffer(linear: &[f32], width: u32, height: u32) -> RenderedResult {
    if width == 0 || height == 0 {
        return RenderedResult::empty();
    }
    let mut pixels = vec![0u8; width as usize * height as usize * 4];
    for (dst, src) in pixels.chunks_exact_mut(4).zip(linear.chunks_exact(4)) {
        dst[0] = quantize(srgb_encode(src[0]));
        dst[1] = quantize(srgb_encode(src[1]));
        dst[2] = quantize(srgb_encode(src[2]));
        dst[3] = quantize(src[3].clamp(0.0, 1.0));
    }
    RenderedResult {
        pixels,
        width,
        height,
        stride: width * 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midgray_round_trips_to_188() {
        let linear = vec![0.5f32, 0.5, 0.5, 1.0];
        let result = encode_backbuffer(&linear, 1, 1);
        assert_eq!(&result.pixels, &[188, 188, 188, 255]);
        assert_eq!(result.stride, 4);
    }

    #[test]
    fn zero_sized_output_is_empty_not_null() {
        let result = encode_backbuffer(&[], 0, 4);
        assert_eq!(result.width, 0);
        assert!(result.pixels.is_empty());
    }

    #[test]
    fn black_and_white_clamp_exactly() {
        let linear = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let result = encode_backbuffer(&linear, 2, 1);
        assert_eq!(&result.pixels[0..4], &[0, 0, 0, 0]);
        assert_eq!(&result.pixels[4..8], &[255, 255, 255, 255]);
    }
}
