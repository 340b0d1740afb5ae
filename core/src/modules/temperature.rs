//! `temperature` (white balance), the early, mosaic-domain half of the
//! chromatic-adaptation negotiation (spec.md §4.8, C8). Runs before
//! `demosaic`: it scales each mosaic sample by its channel's white-balance
//! coefficient, looked up per pixel from the sensor's filter pattern.

use crate::chroma::{CatClaim, ChromaCoordinator};
use crate::descriptor::{BufferDescriptor, CfaColor};
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "temperature",
    default_colorspace: crate::descriptor::ColorSpace::Raw,
    flags: ModuleFlags::ONE_INSTANCE,
    default_group: "color",
    tiling_halo: 0,
};

const F_RED: ParamDescriptor = ParamDescriptor::new("red", 0, ScalarType::F32, 0.1, 8.0);
const F_GREEN: ParamDescriptor = ParamDescriptor::new("green", 4, ScalarType::F32, 0.1, 8.0);
const F_BLUE: ParamDescriptor = ParamDescriptor::new("blue", 8, ScalarType::F32, 0.1, 8.0);
const F_LATE_CORRECTION: ParamDescriptor = ParamDescriptor::new("late_correction", 12, ScalarType::Bool, 0.0, 1.0);

/// Per-piece state captured from the source image at `init_piece` plus the
/// coefficients computed at `commit_params`.
pub struct PieceData {
    pub as_shot: [f32; 4],
    pub filters: crate::descriptor::Filters,
    pub coeffs: [f32; 3],
}

pub struct Temperature;

impl IopModule for Temperature {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 13,
            fields: vec![F_RED, F_GREEN, F_BLUE, F_LATE_CORRECTION],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 13];
        buf[0..4].copy_from_slice(&1.0f32.to_le_bytes());
        buf[4..8].copy_from_slice(&1.0f32.to_le_bytes());
        buf[8..12].copy_from_slice(&1.0f32.to_le_bytes());
        buf[12] = 0;
        buf
    }

    fn init_piece(&self, image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData {
            as_shot: image.as_shot_wb,
            filters: image.filters,
            coeffs: [1.0; 3],
        })
    }

    fn commit_params(
        &self,
        params: &[u8],
        piece_data: &mut dyn Any,
        chroma: &mut ChromaCoordinator,
        piece_id: usize,
        iop_order: f32,
        instance: u32,
    ) -> Result<()> {
        let data = piece_data.downcast_mut::<PieceData>().expect("wrong piece data type");
        let r = f32::from_le_bytes(params[0..4].try_into().unwrap());
        let g = f32::from_le_bytes(params[4..8].try_into().unwrap());
        let b = f32::from_le_bytes(params[8..12].try_into().unwrap());
        let late_correction = params[12] != 0;
        data.coeffs = [r, g, b];

        let wb_coeffs = [r, g, b, g];
        let d65 = [
            r * data.as_shot[0],
            g * data.as_shot[1],
            b * data.as_shot[2],
            g * data.as_shot[3],
        ];
        chroma.publish_wb(wb_coeffs, data.as_shot, d65, late_correction);

        // Only claim the CAT if running full correction here; when
        // `late_correction` is set the calibration piece downstream must
        // perform the adaptation instead.
        if !late_correction {
            chroma.claim_cat(CatClaim {
                piece_id,
                iop_order,
                instance,
            });
        }
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
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        let x0 = ctx.roi_out.x;
        let y0 = ctx.roi_out.y;
        let width = ctx.roi_out.width as i64;
        dst.par_iter_mut()
            .zip(src.par_iter())
            .enumerate()
            .for_each(|(idx, (o, i))| {
                let x = x0 + (idx as i64) % width;
                let y = y0 + (idx as i64) / width;
                let coeff = match data.filters.color_at(x, y) {
                    CfaColor::Red => data.coeffs[0],
                    CfaColor::Green => data.coeffs[1],
                    CfaColor::Blue => data.coeffs[2],
                };
                *o = i * coeff;
            });
        Ok(())
    }
}
