//! `levels`: classic black/gray/white-point remapping, applied identically
//! to each colour channel.

use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "levels",
    default_colorspace: crate::descriptor::ColorSpace::Rgb,
    flags: ModuleFlags::empty(),
    default_group: "tone",
    tiling_halo: 0,
};

const F_BLACK: ParamDescriptor = ParamDescriptor::new("black", 0, ScalarType::F32, 0.0, 0.5);
const F_GRAY: ParamDescriptor = ParamDescriptor::new("gray", 4, ScalarType::F32, 0.01, 0.99);
const F_WHITE: ParamDescriptor = ParamDescriptor::new("white", 8, ScalarType::F32, 0.5, 1.0);

struct PieceData;

pub struct Levels;

impl IopModule for Levels {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 12,
            fields: vec![F_BLACK, F_GRAY, F_WHITE],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        buf[0..4].copy_from_slice(&0.0f32.to_le_bytes());
        buf[4..8].copy_from_slice(&0.5f32.to_le_bytes());
        buf[8..12].copy_from_slice(&1.0f32.to_le_bytes());
        buf
    }

    fn init_piece(&self, _image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData)
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        input
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let black = f32::from_le_bytes(ctx.params[0..4].try_into().unwrap());
        let gray = f32::from_le_bytes(ctx.params[4..8].try_into().unwrap());
        let white = f32::from_le_bytes(ctx.params[8..12].try_into().unwrap());
        let span = (white - black).max(1e-6);
        // Gamma derived from where the gray point sits within [black, white],
        // matching the classic levels-tool midpoint-gamma formulation.
        let mid = ((gray - black) / span).clamp(1e-3, 1.0 - 1e-3);
        let gamma = (mid.ln() / 0.5f32.ln()).recip();
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .for_each(|(o, i)| {
                for c in 0..3.min(channels) {
                    let normalized = ((i[c] - black) / span).clamp(0.0, 1.0);
                    o[c] = normalized.powf(gamma);
                }
                if channels == 4 {
                    o[3] = i[3];
                }
            });
        Ok(())
    }
}
