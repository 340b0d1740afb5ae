//! `channelmixerrgb`: a user-configurable 3x3 RGB-to-RGB matrix, defaulting
//! to identity.

use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "channelmixerrgb",
    default_colorspace: crate::descriptor::ColorSpace::Rgb,
    flags: ModuleFlags::empty(),
    default_group: "color",
    tiling_halo: 0,
};

const FIELD_NAMES: [&str; 9] = [
    "r_r", "r_g", "r_b", "g_r", "g_g", "g_b", "b_r", "b_g", "b_b",
];

fn fields() -> Vec<ParamDescriptor> {
    FIELD_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| ParamDescriptor::new(name, i * 4, ScalarType::F32, -2.0, 2.0))
        .collect()
}

struct PieceData;

pub struct ChannelMixerRgb;

impl IopModule for ChannelMixerRgb {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 36,
            fields: fields(),
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let identity: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut buf = vec![0u8; 36];
        for (i, v) in identity.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
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
        let mut m = [0.0f32; 9];
        for (i, v) in m.iter_mut().enumerate() {
            *v = f32::from_le_bytes(ctx.params[i * 4..i * 4 + 4].try_into().unwrap());
        }
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .for_each(|(o, i)| {
                let (r, g, b) = (i[0], i[1], i[2]);
                o[0] = m[0] * r + m[1] * g + m[2] * b;
                o[1] = m[3] * r + m[4] * g + m[5] * b;
                o[2] = m[6] * r + m[7] * g + m[8] * b;
                if channels == 4 {
                    o[3] = i[3];
                }
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelBuffer;
    use crate::descriptor::BufferDescriptor;
    use crate::roi::Roi;

    #[test]
    fn identity_matrix_is_passthrough() {
        let m = ChannelMixerRgb;
        let dsc = BufferDescriptor::for_rgb();
        let mut input = PixelBuffer::zeroed(1, 1, dsc).unwrap();
        input.as_mut_slice().copy_from_slice(&[0.1, 0.2, 0.3, 1.0]);
        let mut output = PixelBuffer::zeroed(1, 1, dsc).unwrap();
        let roi = Roi::new(0, 0, 1, 1, 1.0);
        let params = m.default_params();
        m.process(ProcessContext {
            input: &input,
            output: &mut output,
            roi_in: roi,
            roi_out: roi,
            params: &params,
            piece_data: &mut PieceData,
        })
        .unwrap();
        assert_eq!(output.as_slice(), &[0.1, 0.2, 0.3, 1.0]);
    }
}
