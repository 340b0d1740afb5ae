//! Buffer descriptor state machine (spec.md §4.1, C1).
//!
//! Every intermediate buffer in the pipeline is tagged with a `BufferDescriptor`.
//! Producers set it via `IopModule::output_format`; consumers assert the shape
//! they expect with `assert_matches`.

use crate::error::{PipelineError, Result};

/// Channel count a buffer may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    One = 1,
    Three = 3,
    Four = 4,
}

/// Per-sample numeric representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float32,
    Uint16,
}

impl DataType {
    pub fn size_bytes(self) -> usize {
        match self {
            DataType::Float32 => 4,
            DataType::Uint16 => 2,
        }
    }
}

/// Colour space tag carried by a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Raw,
    Rgb,
    Lab,
    Xyz,
}

/// Colour-filter-array pattern over a mosaic buffer, or `None` for non-mosaic data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filters {
    None,
    /// Packed 32 bits, two bits per 2x2 cell, per spec.md §6.
    Bayer(u32),
    /// A 6x6 X-Trans pattern; each cell holds a color index 0..=2 (R, G, B).
    XTrans([[u8; 6]; 6]),
}

/// Colour channel at a mosaic sample position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfaColor {
    Red,
    Green,
    Blue,
}

impl Filters {
    /// Colour of the mosaic sample at absolute sensor coordinates `(x, y)`.
    /// For `Bayer`, this is the same two-bits-per-cell decode darktable's
    /// `FC()` macro performs: the pattern repeats every 2x2 cell, so only
    /// the low bit of each coordinate selects the cell phase.
    pub fn color_at(&self, x: i64, y: i64) -> CfaColor {
        match self {
            Filters::None => CfaColor::Green,
            Filters::Bayer(mask) => {
                let px = (x.rem_euclid(2)) as u32;
                let py = (y.rem_euclid(2)) as u32;
                let shift = (((py << 1) & 14) + (px & 1)) << 1;
                match (mask >> shift) & 3 {
                    0 => CfaColor::Red,
                    2 => CfaColor::Blue,
                    _ => CfaColor::Green,
                }
            }
            Filters::XTrans(pattern) => {
                let px = (x.rem_euclid(6)) as usize;
                let py = (y.rem_euclid(6)) as usize;
                match pattern[py][px] {
                    0 => CfaColor::Red,
                    2 => CfaColor::Blue,
                    _ => CfaColor::Green,
                }
            }
        }
    }
}

/// `{channels, datatype, colorspace, filters, processed_maximum[3]}` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferDescriptor {
    pub channels: Channels,
    pub datatype: DataType,
    pub colorspace: ColorSpace,
    pub filters: Filters,
    pub processed_maximum: [f32; 3],
}

impl BufferDescriptor {
    /// A descriptor with no meaningful content; used as a placeholder before
    /// the first `output_format` call populates it.
    pub fn zero() -> Self {
        BufferDescriptor {
            channels: Channels::One,
            datatype: DataType::Float32,
            colorspace: ColorSpace::Raw,
            filters: Filters::None,
            processed_maximum: [1.0; 3],
        }
    }

    /// Descriptor for the raw mosaic working buffer (1-channel, float, `raw`).
    pub fn for_raw(filters: Filters, white_point: f32) -> Self {
        BufferDescriptor {
            channels: Channels::One,
            datatype: DataType::Float32,
            colorspace: ColorSpace::Raw,
            filters,
            processed_maximum: [white_point; 3],
        }
    }

    /// Descriptor for a demosaiced / non-mosaic working buffer (4-channel RGBA float).
    pub fn for_rgb() -> Self {
        BufferDescriptor {
            channels: Channels::Four,
            datatype: DataType::Float32,
            colorspace: ColorSpace::Rgb,
            filters: Filters::None,
            processed_maximum: [1.0; 3],
        }
    }

    /// Fails with `DescriptorMismatch` if any field diverges from `expected`.
    pub fn assert_matches(&self, expected: &BufferDescriptor) -> Result<()> {
        if self.channels != expected.channels
            || self.datatype != expected.datatype
            || self.colorspace != expected.colorspace
            || self.filters != expected.filters
        {
            return Err(PipelineError::DescriptorMismatch {
                expected: *expected,
                actual: *self,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rggb_corners() {
        // RGGB: (0,0)=R, (1,0)=G, (0,1)=G, (1,1)=B.
        let filters = Filters::Bayer(0x94949494);
        assert_eq!(filters.color_at(0, 0), CfaColor::Red);
        assert_eq!(filters.color_at(1, 0), CfaColor::Green);
        assert_eq!(filters.color_at(0, 1), CfaColor::Green);
        assert_eq!(filters.color_at(1, 1), CfaColor::Blue);
        // Pattern repeats every 2 pixels.
        assert_eq!(filters.color_at(2, 0), CfaColor::Red);
        assert_eq!(filters.color_at(0, 2), CfaColor::Red);
    }

    #[test]
    fn assert_matches_reports_mismatch() {
        let a = BufferDescriptor::for_raw(Filters::None, 1.0);
        let b = BufferDescriptor::for_rgb();
        assert!(a.assert_matches(&b).is_err());
        assert!(a.assert_matches(&a).is_ok());
    }
}
