//! `colorin`: maps the demosaiced buffer from camera-native RGB into the
//! pipeline's working colour space using the source image's camera-to-XYZ
//! matrix (spec.md §3 "Image" / "camera colour matrix"). Default-enabled
//! (spec.md §6).

use crate::descriptor::{BufferDescriptor, ColorSpace};
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::ParamTable;
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "colorin",
    default_colorspace: ColorSpace::Rgb,
    flags: ModuleFlags::ONE_INSTANCE,
    default_group: "color",
    tiling_halo: 0,
};

struct PieceData {
    matrix: [[f32; 3]; 3],
}

pub struct ColorIn;

impl IopModule for ColorIn {
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

    fn init_piece(&self, image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData {
            matrix: image.camera_matrix,
        })
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        BufferDescriptor {
            colorspace: ColorSpace::Rgb,
            ..input
        }
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let data = ctx
            .piece_data
            .downcast_ref::<PieceData>()
            .expect("wrong piece data type");
        let m = data.matrix;
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .for_each(|(o, i)| {
                let r = i[0];
                let g = i[1];
                let b = i[2];
                o[0] = m[0][0] * r + m[0][1] * g + m[0][2] * b;
                o[1] = m[1][0] * r + m[1][1] * g + m[1][2] * b;
                o[2] = m[2][0] * r + m[2][1] * g + m[2][2] * b;
                if channels == 4 {
                    o[3] = i[3];
                }
            });
        Ok(())
    }
}
