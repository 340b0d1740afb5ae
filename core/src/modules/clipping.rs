//! `clipping`: the other geometric `ROI_STRICT` module (spec.md §4.4) —
//! 90-degree-multiple rotation plus optional axis flips, the remaining
//! piece of sensor-orientation handling beyond what `Image::orientation`
//! already encodes upstream.
//!
//! Rotating by a quarter turn is not representable as a simple sub-rectangle
//! mapping the way `crop` is, so whenever a non-zero rotation is configured
//! `modify_roi_in` conservatively requests the *entire* upstream image at
//! the requested scale rather than trying to derive the minimal supporting
//! region — safe per the "never smaller than truly needed" contract, just
//! not tile-optimal.

use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use crate::roi::Roi;
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "clipping",
    default_colorspace: crate::descriptor::ColorSpace::Rgb,
    flags: ModuleFlags::ROI_STRICT,
    default_group: "geometry",
    tiling_halo: 0,
};

const F_ROTATE: ParamDescriptor = ParamDescriptor::new("rotate", 0, ScalarType::I32, 0.0, 3.0);
const F_FLIP_H: ParamDescriptor = ParamDescriptor::new("flip_h", 4, ScalarType::Bool, 0.0, 1.0);
const F_FLIP_V: ParamDescriptor = ParamDescriptor::new("flip_v", 5, ScalarType::Bool, 0.0, 1.0);

pub struct PieceData {
    pub image_width: u32,
    pub image_height: u32,
}

pub struct Clipping;

struct Params {
    quarter_turns: i32,
    flip_h: bool,
    flip_v: bool,
}

fn read_params(bytes: &[u8]) -> Params {
    Params {
        quarter_turns: i32::from_le_bytes(bytes[0..4].try_into().unwrap()).rem_euclid(4),
        flip_h: bytes[4] != 0,
        flip_v: bytes[5] != 0,
    }
}

impl IopModule for Clipping {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 6,
            fields: vec![F_ROTATE, F_FLIP_H, F_FLIP_V],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        vec![0u8; 6]
    }

    fn init_piece(&self, image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData {
            image_width: image.width,
            image_height: image.height,
        })
    }

    fn modify_roi_out(&self, params: &[u8], _piece_data: &dyn Any, roi_in: Roi) -> Roi {
        let p = read_params(params);
        if p.quarter_turns % 2 == 1 {
            Roi {
                width: roi_in.height,
                height: roi_in.width,
                ..roi_in
            }
        } else {
            roi_in
        }
    }

    fn modify_roi_in(&self, params: &[u8], piece_data: &dyn Any, roi_out: Roi) -> Roi {
        let p = read_params(params);
        if p.quarter_turns == 0 && !p.flip_h && !p.flip_v {
            return roi_out;
        }
        let data = piece_data.downcast_ref::<PieceData>().expect("wrong piece data type");
        let w = (data.image_width as f32 * roi_out.scale).round() as u32;
        let h = (data.image_height as f32 * roi_out.scale).round() as u32;
        Roi {
            x: 0,
            y: 0,
            width: w.max(1),
            height: h.max(1),
            scale: roi_out.scale,
        }
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        input
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let p = read_params(ctx.params);
        let in_w = ctx.roi_in.width as i64;
        let in_h = ctx.roi_in.height as i64;
        let out_w = ctx.roi_out.width as i64;
        let out_h = ctx.roi_out.height as i64;
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let row_stride = (out_w as usize) * channels;

        ctx.output
            .as_mut_slice()
            .par_chunks_exact_mut(row_stride)
            .enumerate()
            .for_each(|(oy, out_row)| {
                let oy = oy as i64;
                for ox in 0..out_w {
                    // Map output pixel back through the flips, then the
                    // rotation, to the corresponding input pixel.
                    let (mut sx, mut sy) = match p.quarter_turns {
                        0 => (ox, oy),
                        1 => (oy, in_h - 1 - ox),
                        2 => (in_w - 1 - ox, in_h - 1 - oy),
                        _ => (in_w - 1 - oy, ox),
                    };
                    if p.flip_h {
                        sx = in_w - 1 - sx;
                    }
                    if p.flip_v {
                        sy = in_h - 1 - sy;
                    }
                    sx = sx.clamp(0, in_w - 1);
                    sy = sy.clamp(0, in_h - 1);
                    let src_idx = ((sy * in_w + sx) * channels as i64) as usize;
                    let dst_idx = (ox as usize) * channels;
                    out_row[dst_idx..dst_idx + channels]
                        .copy_from_slice(&src[src_idx..src_idx + channels]);
                }
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_params_keep_roi_unchanged() {
        let m = Clipping;
        let data = PieceData {
            image_width: 10,
            image_height: 10,
        };
        let params = m.default_params();
        let roi = Roi::new(0, 0, 10, 10, 1.0);
        assert_eq!(m.modify_roi_out(&params, &data, roi), roi);
        assert_eq!(m.modify_roi_in(&params, &data, roi), roi);
    }

    #[test]
    fn quarter_turn_swaps_dimensions() {
        let m = Clipping;
        let mut params = vec![0u8; 6];
        params[0..4].copy_from_slice(&1i32.to_le_bytes());
        let roi = Roi::new(0, 0, 10, 20, 1.0);
        let out = m.modify_roi_out(&params, &PieceData { image_width: 10, image_height: 20 }, roi);
        assert_eq!((out.width, out.height), (20, 10));
    }
}
