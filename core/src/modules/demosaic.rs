//! `demosaic`: the format-changing raw-to-rgb module (spec.md §4.1). Turns a
//! 1-channel mosaic buffer into 4-channel RGBA by either simple bilinear
//! interpolation of same-colour neighbours, or (method `identity`) by
//! replicating the mosaic sample into all three colour channels — the
//! stubbed behaviour spec.md's end-to-end scenario 2 exercises directly.
//!
//! Demosaicing quality (its detailed colour science) is explicitly out of
//! scope for the core (spec.md §1); only the descriptor transition and the
//! ROI contract matter here.

use crate::descriptor::{BufferDescriptor, CfaColor, Channels, ColorSpace, DataType, Filters};
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "demosaic",
    default_colorspace: ColorSpace::Raw,
    flags: ModuleFlags::empty(),
    default_group: "basic",
    tiling_halo: 2,
};

const F_METHOD: ParamDescriptor = ParamDescriptor::new("method", 0, ScalarType::I32, 0.0, 1.0);

pub const METHOD_IDENTITY: i32 = 0;
pub const METHOD_BILINEAR: i32 = 1;

struct PieceData {
    filters: Filters,
}

pub struct Demosaic;

impl IopModule for Demosaic {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 4,
            fields: vec![F_METHOD],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        METHOD_BILINEAR.to_le_bytes().to_vec()
    }

    fn init_piece(&self, image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData {
            filters: image.filters,
        })
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        BufferDescriptor {
            channels: Channels::Four,
            datatype: DataType::Float32,
            colorspace: ColorSpace::Rgb,
            filters: Filters::None,
            processed_maximum: input.processed_maximum,
        }
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let method = i32::from_le_bytes(ctx.params[0..4].try_into().unwrap());
        let data = ctx
            .piece_data
            .downcast_ref::<PieceData>()
            .expect("wrong piece data type");
        let width = ctx.roi_out.width as i64;
        let height = ctx.roi_out.height as i64;
        let x0 = ctx.roi_out.x;
        let y0 = ctx.roi_out.y;
        let src = ctx.input.as_slice();
        let get = |x: i64, y: i64| -> f32 {
            let cx = x.clamp(x0, x0 + width - 1) - x0;
            let cy = y.clamp(y0, y0 + height - 1) - y0;
            src[(cy * width + cx) as usize]
        };

        let row_stride = (width * 4) as usize;
        ctx.output
            .as_mut_slice()
            .par_chunks_exact_mut(row_stride)
            .enumerate()
            .for_each(|(row, out_row)| {
                let row = row as i64;
                for col in 0..width {
                    let x = x0 + col;
                    let y = y0 + row;
                    let out_idx = (col * 4) as usize;
                    let here = get(x, y);
                    let rgb = if method == METHOD_IDENTITY {
                        [here, here, here]
                    } else {
                        bilinear_rgb(data.filters, x, y, &get)
                    };
                    out_row[out_idx] = rgb[0];
                    out_row[out_idx + 1] = rgb[1];
                    out_row[out_idx + 2] = rgb[2];
                    out_row[out_idx + 3] = 1.0;
                }
            });
        Ok(())
    }
}

/// Averages the 4-connected same-colour and cross-colour neighbours of
/// `(x, y)` to approximate the missing two channels, à la a minimal
/// bilinear demosaic.
fn bilinear_rgb(filters: Filters, x: i64, y: i64, get: &dyn Fn(i64, i64) -> f32) -> [f32; 3] {
    let here = get(x, y);
    let color = filters.color_at(x, y);
    let mut rgb = [0.0f32; 3];
    let idx = |c: CfaColor| match c {
        CfaColor::Red => 0,
        CfaColor::Green => 1,
        CfaColor::Blue => 2,
    };
    rgb[idx(color)] = here;

    // Average same-colour diagonal neighbours for the channel already
    // present at this phase isn't needed (we have the exact sample); for
    // the other two channels, average whichever of the four orthogonal
    // neighbours carry that colour.
    for target in [CfaColor::Red, CfaColor::Green, CfaColor::Blue] {
        if target == color {
            continue;
        }
        let neighbours = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)];
        let mut sum = 0.0f32;
        let mut count = 0.0f32;
        for (nx, ny) in neighbours {
            if filters.color_at(nx, ny) == target {
                sum += get(nx, ny);
                count += 1.0;
            }
        }
        rgb[idx(target)] = if count > 0.0 {
            sum / count
        } else {
            here
        };
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelBuffer;
    use crate::roi::Roi;

    #[test]
    fn identity_method_replicates_sample() {
        let m = Demosaic;
        let filters = Filters::Bayer(0x94949494);
        let in_dsc = BufferDescriptor::for_raw(filters, 1.0);
        let mut input = PixelBuffer::zeroed(2, 2, in_dsc).unwrap();
        input.as_mut_slice().copy_from_slice(&[0.25, 0.5, 0.75, 1.0]);
        let out_dsc = m.output_format(in_dsc);
        let mut output = PixelBuffer::zeroed(2, 2, out_dsc).unwrap();
        let roi = Roi::new(0, 0, 2, 2, 1.0);
        let mut pd = PieceData { filters };
        m.process(ProcessContext {
            input: &input,
            output: &mut output,
            roi_in: roi,
            roi_out: roi,
            params: &METHOD_IDENTITY.to_le_bytes(),
            piece_data: &mut pd,
        })
        .unwrap();
        assert_eq!(output.pixel(0, 0), &[0.25, 0.25, 0.25, 1.0]);
        assert_eq!(output.pixel(1, 1), &[1.0, 1.0, 1.0, 1.0]);
    }
}
