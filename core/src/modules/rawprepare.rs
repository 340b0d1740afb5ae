//! `rawprepare`: black-level subtraction on the raw mosaic (spec.md §1 lists
//! it alongside `demosaic` as a format-changing module — here it is raw to
//! raw, but it renormalises the processed maximum, so the descriptor's
//! `processed_maximum` must be reset to `1.0` for any downstream consumer).
//!
//! The pipeline's own lazy unpack (C9) already divides every sample by
//! `raw_white_point`, so by the time `process` runs the buffer is already in
//! `[0, 1]`; this module only subtracts a user black level and rescales the
//! remaining headroom back up to `1.0`.

use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use crate::roi::Roi;
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "rawprepare",
    default_colorspace: crate::descriptor::ColorSpace::Raw,
    flags: ModuleFlags::empty(),
    default_group: "basic",
    tiling_halo: 0,
};

const F_BLACK: ParamDescriptor = ParamDescriptor::new("black", 0, ScalarType::F32, 0.0, 0.25);

struct PieceData;

pub struct RawPrepare;

impl IopModule for RawPrepare {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 4,
            fields: vec![F_BLACK],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 4];
        buf[0..4].copy_from_slice(&0.0f32.to_le_bytes());
        buf
    }

    fn init_piece(&self, _image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData)
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        let mut out = input;
        out.processed_maximum = [1.0; 3];
        out
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let black = f32::from_le_bytes(ctx.params[0..4].try_into().unwrap());
        let scale = if black >= 1.0 { 1.0 } else { 1.0 / (1.0 - black) };
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_iter_mut().zip(src.par_iter()).for_each(|(o, i)| {
            *o = ((i - black) * scale).max(0.0);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelBuffer;
    use crate::descriptor::Filters;

    #[test]
    fn zero_black_is_identity() {
        let m = RawPrepare;
        let dsc = BufferDescriptor::for_raw(Filters::None, 1.0);
        let mut input = PixelBuffer::zeroed(2, 2, dsc).unwrap();
        input.as_mut_slice().copy_from_slice(&[0.25, 0.5, 0.75, 1.0]);
        let mut output = PixelBuffer::zeroed(2, 2, dsc).unwrap();
        let roi = Roi::new(0, 0, 2, 2, 1.0);
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
        assert_eq!(output.as_slice(), &[0.25, 0.5, 0.75, 1.0]);
    }
}
