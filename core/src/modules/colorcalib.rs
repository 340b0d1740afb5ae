//! `colorcalib` (color calibration): the late half of the chromatic-
//! adaptation negotiation (spec.md §4.8, C8). Runs after demosaic/colorin;
//! if `temperature` already claimed the CAT (the common case, since it is
//! earlier in the chain), this module degrades to an identity transform.
//! It only performs the adaptation itself when `temperature` published
//! `late_correction = true` and ceded the claim.

use crate::chroma::{CatClaim, ChromaCoordinator};
use crate::descriptor::{BufferDescriptor, ColorSpace};
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::ParamTable;
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "colorcalib",
    default_colorspace: ColorSpace::Rgb,
    flags: ModuleFlags::empty(),
    default_group: "color",
    tiling_halo: 0,
};

struct PieceData {
    /// Diagonal scaling applied when this piece holds the CAT claim; the
    /// identity `[1,1,1]` otherwise.
    gains: [f32; 3],
}

pub struct ColorCalib;

impl IopModule for ColorCalib {
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
        Box::new(PieceData { gains: [1.0; 3] })
    }

    fn commit_params(
        &self,
        _params: &[u8],
        piece_data: &mut dyn Any,
        chroma: &mut ChromaCoordinator,
        piece_id: usize,
        iop_order: f32,
        instance: u32,
    ) -> Result<()> {
        let data = piece_data.downcast_mut::<PieceData>().expect("wrong piece data type");
        let granted = chroma.claim_cat(CatClaim {
            piece_id,
            iop_order,
            instance,
        });
        data.gains = if granted && chroma.late_correction {
            let d65 = chroma.d65_coeffs;
            let wb = chroma.wb_coeffs;
            [
                safe_ratio(d65[0], wb[0]),
                safe_ratio(d65[1], wb[1]),
                safe_ratio(d65[2], wb[2]),
            ]
        } else {
            [1.0; 3]
        };
        Ok(())
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        input
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let data = ctx
            .piece_data
            .downcast_ref::<PieceData>()
            .expect("wrong piece data type");
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .for_each(|(o, i)| {
                o[0] = i[0] * data.gains[0];
                o[1] = i[1] * data.gains[1];
                o[2] = i[2] * data.gains[2];
                if channels == 4 {
                    o[3] = i[3];
                }
            });
        Ok(())
    }
}

fn safe_ratio(a: f32, b: f32) -> f32 {
    if b.abs() < 1e-8 {
        1.0
    } else {
        a / b
    }
}
