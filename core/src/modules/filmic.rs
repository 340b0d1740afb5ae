//! `filmic`: a simplified highlight-compressing tone mapper. The real
//! module's full filmic-RGB curve construction is detailed colour science
//! out of scope for the core (spec.md §1); this applies a Reinhard-style
//! compression between a configurable black and white point.

use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "filmic",
    default_colorspace: crate::descriptor::ColorSpace::Rgb,
    flags: ModuleFlags::empty(),
    default_group: "tone",
    tiling_halo: 0,
};

const F_BLACK: ParamDescriptor = ParamDescriptor::new("black_point", 0, ScalarType::F32, -4.0, 0.0);
const F_WHITE: ParamDescriptor = ParamDescriptor::new("white_point", 4, ScalarType::F32, 1.0, 16.0);
const F_CONTRAST: ParamDescriptor = ParamDescriptor::new("contrast", 8, ScalarType::F32, 0.5, 2.5);

struct PieceData;

pub struct Filmic;

impl IopModule for Filmic {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 12,
            fields: vec![F_BLACK, F_WHITE, F_CONTRAST],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        buf[0..4].copy_from_slice(&(-3.0f32).to_le_bytes());
        buf[4..8].copy_from_slice(&4.0f32.to_le_bytes());
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
        let black_ev = f32::from_le_bytes(ctx.params[0..4].try_into().unwrap());
        let white_point = f32::from_le_bytes(ctx.params[4..8].try_into().unwrap());
        let contrast = f32::from_le_bytes(ctx.params[8..12].try_into().unwrap());
        let black = 2f32.powf(black_ev);
        let span = (white_point - black).max(1e-6);
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .for_each(|(o, i)| {
                for c in 0..3.min(channels) {
                    let normalized = ((i[c] - black) / span).max(0.0);
                    let contrasted = normalized.powf(contrast);
                    o[c] = (contrasted / (contrasted + 1.0)).clamp(0.0, 1.0);
                }
                if channels == 4 {
                    o[3] = i[3];
                }
            });
        Ok(())
    }
}
