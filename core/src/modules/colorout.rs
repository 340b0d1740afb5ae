//! `colorout`: the pipeline's final colour-space conversion, from the
//! working RGB space to the output RGB space the encoder (C10) expects.
//! ICC profile application is out of scope for the core (spec.md §1); this
//! module only clamps into range and is default-enabled (spec.md §6).

use crate::descriptor::{BufferDescriptor, ColorSpace};
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::ParamTable;
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "colorout",
    default_colorspace: ColorSpace::Rgb,
    flags: ModuleFlags::ONE_INSTANCE,
    default_group: "color",
    tiling_halo: 0,
};

struct PieceData;

pub struct ColorOut;

impl IopModule for ColorOut {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 1,
            fields: vec![],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        vec![0u8]
    }

    fn init_piece(&self, _image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData)
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        BufferDescriptor {
            colorspace: ColorSpace::Rgb,
            ..input
        }
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .for_each(|(o, i)| {
                for c in 0..3.min(channels) {
                    o[c] = i[c].clamp(0.0, 1.0);
                }
                if channels == 4 {
                    o[3] = i[3].clamp(0.0, 1.0);
                }
            });
        Ok(())
    }
}
