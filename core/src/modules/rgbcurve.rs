//! `rgbcurve`: a simplified three-point tone curve (shadows / midtones /
//! highlights gain), applied per channel. Full spline-based curve editing
//! is out of scope for the core.

use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "rgbcurve",
    default_colorspace: crate::descriptor::ColorSpace::Rgb,
    flags: ModuleFlags::empty(),
    default_group: "tone",
    tiling_halo: 0,
};

const F_SHADOWS: ParamDescriptor = ParamDescriptor::new("shadows", 0, ScalarType::F32, 0.0, 2.0);
const F_MIDTONES: ParamDescriptor = ParamDescriptor::new("midtones", 4, ScalarType::F32, 0.0, 2.0);
const F_HIGHLIGHTS: ParamDescriptor = ParamDescriptor::new("highlights", 8, ScalarType::F32, 0.0, 2.0);

struct PieceData;

pub struct RgbCurve;

/// Blends the three gains with triangular weights centred at 0, 0.5, 1.0.
fn curve_gain(x: f32, shadows: f32, mid: f32, highlights: f32) -> f32 {
    if x < 0.5 {
        let t = (x * 2.0).clamp(0.0, 1.0);
        shadows + (mid - shadows) * t
    } else {
        let t = ((x - 0.5) * 2.0).clamp(0.0, 1.0);
        mid + (highlights - mid) * t
    }
}

impl IopModule for RgbCurve {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 12,
            fields: vec![F_SHADOWS, F_MIDTONES, F_HIGHLIGHTS],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        for chunk in buf.chunks_exact_mut(4) {
            chunk.copy_from_slice(&1.0f32.to_le_bytes());
        }
        buf
    }

    fn init_piece(&self, _image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData)
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        input
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let shadows = f32::from_le_bytes(ctx.params[0..4].try_into().unwrap());
        let mid = f32::from_le_bytes(ctx.params[4..8].try_into().unwrap());
        let highlights = f32::from_le_bytes(ctx.params[8..12].try_into().unwrap());
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .for_each(|(o, i)| {
                for c in 0..3.min(channels) {
                    let x = i[c].clamp(0.0, 1.0);
                    o[c] = i[c] * curve_gain(x, shadows, mid, highlights);
                }
                if channels == 4 {
                    o[3] = i[3];
                }
            });
        Ok(())
    }
}
