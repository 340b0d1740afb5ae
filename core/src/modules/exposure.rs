//! `exposure`: black-point subtraction plus an EV-stop gain, the simplest
//! possible linear module. Default-enabled (spec.md §6).

use crate::descriptor::{BufferDescriptor, ColorSpace};
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "exposure",
    default_colorspace: ColorSpace::Rgb,
    flags: ModuleFlags::empty(),
    default_group: "basic",
    tiling_halo: 0,
};

const F_BLACK: ParamDescriptor = ParamDescriptor::new("black", 0, ScalarType::F32, -0.1, 0.1);
const F_EXPOSURE: ParamDescriptor = ParamDescriptor::new("exposure", 4, ScalarType::F32, -3.0, 3.0);

struct PieceData;

pub struct Exposure;

impl IopModule for Exposure {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 8,
            fields: vec![F_BLACK, F_EXPOSURE],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 8];
        buf[0..4].copy_from_slice(&0.0f32.to_le_bytes());
        buf[4..8].copy_from_slice(&0.0f32.to_le_bytes());
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
        let ev = f32::from_le_bytes(ctx.params[4..8].try_into().unwrap());
        let gain = 2f32.powf(ev);
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        // Data-parallel across pixels (spec.md §5 "within a piece, pixel
        // kernels are data-parallel across rows"): every pixel here is
        // independent, so rayon chunks the work across the engine's worker
        // pool the same way the teacher's `apply_filters` does.
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .for_each(|(o, i)| {
                for c in 0..3.min(channels) {
                    o[c] = (i[c] - black) * gain;
                }
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
    use crate::roi::Roi;

    #[test]
    fn zero_ev_zero_black_is_identity() {
        let m = Exposure;
        let dsc = BufferDescriptor::for_rgb();
        let mut input = PixelBuffer::zeroed(1, 1, dsc).unwrap();
        input.as_mut_slice().copy_from_slice(&[0.2, 0.4, 0.6, 1.0]);
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
        assert_eq!(output.as_slice(), &[0.2, 0.4, 0.6, 1.0]);
    }

    #[test]
    fn one_stop_doubles_rgb() {
        let m = Exposure;
        let dsc = BufferDescriptor::for_rgb();
        let mut input = PixelBuffer::zeroed(1, 1, dsc).unwrap();
        input.as_mut_slice().copy_from_slice(&[0.2, 0.2, 0.2, 1.0]);
        let mut output = PixelBuffer::zeroed(1, 1, dsc).unwrap();
        let roi = Roi::new(0, 0, 1, 1, 1.0);
        let mut params = vec![0u8; 8];
        params[4..8].copy_from_slice(&1.0f32.to_le_bytes());
        m.process(ProcessContext {
            input: &input,
            output: &mut output,
            roi_in: roi,
            roi_out: roi,
            params: &params,
            piece_data: &mut PieceData,
        })
        .unwrap();
        for c in 0..3 {
            assert!((output.as_slice()[c] - 0.4).abs() < 1e-6);
        }
    }
}
