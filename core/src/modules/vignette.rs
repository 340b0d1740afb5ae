//! `vignette`: radial darkening falloff from the image centre. Needs the
//! *full* image extent (captured at `init_piece`) since the falloff depends
//! on absolute position within the whole frame, not just within whatever
//! tile or ROI `process` happens to be handed.

use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "vignette",
    default_colorspace: crate::descriptor::ColorSpace::Rgb,
    flags: ModuleFlags::ALLOW_TILING,
    default_group: "effect",
    tiling_halo: 0,
};

const F_STRENGTH: ParamDescriptor = ParamDescriptor::new("strength", 0, ScalarType::F32, 0.0, 1.0);
const F_RADIUS: ParamDescriptor = ParamDescriptor::new("radius", 4, ScalarType::F32, 0.0, 1.5);
const F_FEATHER: ParamDescriptor = ParamDescriptor::new("feather", 8, ScalarType::F32, 0.01, 1.0);

struct PieceData {
    image_width: u32,
    image_height: u32,
}

pub struct Vignette;

impl IopModule for Vignette {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 12,
            fields: vec![F_STRENGTH, F_RADIUS, F_FEATHER],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        buf[0..4].copy_from_slice(&0.0f32.to_le_bytes());
        buf[4..8].copy_from_slice(&0.8f32.to_le_bytes());
        buf[8..12].copy_from_slice(&0.5f32.to_le_bytes());
        buf
    }

    fn init_piece(&self, image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData {
            image_width: image.width,
            image_height: image.height,
        })
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        input
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let strength = f32::from_le_bytes(ctx.params[0..4].try_into().unwrap());
        let radius = f32::from_le_bytes(ctx.params[4..8].try_into().unwrap());
        let feather = f32::from_le_bytes(ctx.params[8..12].try_into().unwrap()).max(1e-3);
        let data = ctx
            .piece_data
            .downcast_ref::<PieceData>()
            .expect("wrong piece data type");

        if strength <= 0.0 {
            ctx.output.as_mut_slice().copy_from_slice(ctx.input.as_slice());
            return Ok(());
        }

        let full_w = data.image_width as f32 * ctx.roi_out.scale;
        let full_h = data.image_height as f32 * ctx.roi_out.scale;
        let cx = full_w * 0.5;
        let cy = full_h * 0.5;
        let max_dist = (cx * cx + cy * cy).sqrt().max(1e-6);

        let width = ctx.roi_out.width as i64;
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .enumerate()
            .for_each(|(idx, (o, i))| {
                let x = (ctx.roi_out.x + (idx as i64) % width) as f32 + 0.5;
                let y = (ctx.roi_out.y + (idx as i64) / width) as f32 + 0.5;
                let dist = (((x - cx).powi(2) + (y - cy).powi(2)).sqrt() / max_dist).min(1.0);
                let falloff = if dist <= radius {
                    1.0
                } else {
                    let t = ((dist - radius) / feather).clamp(0.0, 1.0);
                    1.0 - strength * t
                };
                for c in 0..3.min(channels) {
                    o[c] = i[c] * falloff;
                }
                if channels == 4 {
                    o[3] = i[3];
                }
            });
        Ok(())
    }
}
