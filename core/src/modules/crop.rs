//! `crop`: a geometric module whose output ROI is a strict function of its
//! input ROI (spec.md §4.4, `ROI_STRICT`). Parameters are relative
//! fractions of the full image (`cx, cy, cw, ch` in `[0, 1]`), matching
//! spec.md §8 scenario 6.

use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use crate::roi::Roi;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "crop",
    default_colorspace: crate::descriptor::ColorSpace::Rgb,
    flags: ModuleFlags::ROI_STRICT,
    default_group: "geometry",
    tiling_halo: 0,
};

const F_CX: ParamDescriptor = ParamDescriptor::new("cx", 0, ScalarType::F32, 0.0, 1.0);
const F_CY: ParamDescriptor = ParamDescriptor::new("cy", 4, ScalarType::F32, 0.0, 1.0);
const F_CW: ParamDescriptor = ParamDescriptor::new("cw", 8, ScalarType::F32, 0.0, 1.0);
const F_CH: ParamDescriptor = ParamDescriptor::new("ch", 12, ScalarType::F32, 0.0, 1.0);

pub struct PieceData {
    pub image_width: u32,
    pub image_height: u32,
}

pub struct Crop;

struct CropBox {
    cx: f32,
    cy: f32,
    cw: f32,
    ch: f32,
}

fn read_box(params: &[u8]) -> CropBox {
    CropBox {
        cx: f32::from_le_bytes(params[0..4].try_into().unwrap()),
        cy: f32::from_le_bytes(params[4..8].try_into().unwrap()),
        cw: f32::from_le_bytes(params[8..12].try_into().unwrap()),
        ch: f32::from_le_bytes(params[12..16].try_into().unwrap()),
    }
}

/// Crop box in absolute pixel coordinates at a given scale.
fn crop_box_px(b: &CropBox, image_width: u32, image_height: u32, scale: f32) -> (i64, i64, i64, i64) {
    let img_w = (image_width as f32 * scale).round() as i64;
    let img_h = (image_height as f32 * scale).round() as i64;
    let x0 = (b.cx * img_w as f32).round() as i64;
    let y0 = (b.cy * img_h as f32).round() as i64;
    let w = (b.cw * img_w as f32).round() as i64;
    let h = (b.ch * img_h as f32).round() as i64;
    (x0, y0, w.max(0), h.max(0))
}

impl IopModule for Crop {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: 1,
            struct_size: 16,
            fields: vec![F_CX, F_CY, F_CW, F_CH],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let b = CropBox {
            cx: 0.0,
            cy: 0.0,
            cw: 1.0,
            ch: 1.0,
        };
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(&b.cx.to_le_bytes());
        buf[4..8].copy_from_slice(&b.cy.to_le_bytes());
        buf[8..12].copy_from_slice(&b.cw.to_le_bytes());
        buf[12..16].copy_from_slice(&b.ch.to_le_bytes());
        buf
    }

    fn init_piece(&self, image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData {
            image_width: image.width,
            image_height: image.height,
        })
    }

    fn modify_roi_in(&self, params: &[u8], piece_data: &dyn Any, roi_out: Roi) -> Roi {
        let data = piece_data.downcast_ref::<PieceData>().expect("wrong piece data type");
        let b = read_box(params);
        let (cx0, cy0, _, _) = crop_box_px(&b, data.image_width, data.image_height, roi_out.scale);
        Roi {
            x: roi_out.x + cx0,
            y: roi_out.y + cy0,
            width: roi_out.width,
            height: roi_out.height,
            scale: roi_out.scale,
        }
    }

    fn modify_roi_out(&self, params: &[u8], piece_data: &dyn Any, roi_in: Roi) -> Roi {
        let data = piece_data.downcast_ref::<PieceData>().expect("wrong piece data type");
        let b = read_box(params);
        let (cx0, cy0, cw, ch) = crop_box_px(&b, data.image_width, data.image_height, roi_in.scale);
        let x0 = roi_in.x.max(cx0);
        let y0 = roi_in.y.max(cy0);
        let x1 = (roi_in.x + roi_in.width as i64).min(cx0 + cw);
        let y1 = (roi_in.y + roi_in.height as i64).min(cy0 + ch);
        Roi {
            x: 0,
            y: 0,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
            scale: roi_in.scale,
        }
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        input
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        // `roi_in` is already exactly the cropped sub-rectangle of the
        // upstream buffer (computed by `modify_roi_in`), so the pixel data
        // transfers unchanged.
        ctx.output.as_mut_slice().copy_from_slice(ctx.input.as_slice());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_crop_of_100x100_yields_50x50_offset_25() {
        let m = Crop;
        let data = PieceData {
            image_width: 100,
            image_height: 100,
        };
        let mut params = vec![0u8; 16];
        params[0..4].copy_from_slice(&0.25f32.to_le_bytes());
        params[4..8].copy_from_slice(&0.25f32.to_le_bytes());
        params[8..12].copy_from_slice(&0.75f32.to_le_bytes());
        params[12..16].copy_from_slice(&0.75f32.to_le_bytes());

        let full = Roi::new(0, 0, 100, 100, 1.0);
        let out = m.modify_roi_out(&params, &data, full);
        assert_eq!((out.width, out.height), (50, 50));

        let requested = Roi::new(0, 0, 50, 50, 1.0);
        let roi_in = m.modify_roi_in(&params, &data, requested);
        assert_eq!((roi_in.x, roi_in.y), (25, 25));
    }

    proptest::proptest! {
        /// Backward-forward composition invariant (spec.md §4.2, §8): feeding an
        /// arbitrary requested output ROI through `modify_roi_in` then back through
        /// `modify_roi_out` must yield a region that contains the original request.
        #[test]
        fn roi_round_trip_never_shrinks_below_request(
            img_w in 8u32..4000,
            img_h in 8u32..4000,
            cx in 0.0f32..0.9,
            cy in 0.0f32..0.9,
            cw in 0.05f32..1.0,
            ch in 0.05f32..1.0,
            rx in 0i64..200,
            ry in 0i64..200,
            rw in 4u32..500,
            rh in 4u32..500,
        ) {
            let m = Crop;
            let data = PieceData { image_width: img_w, image_height: img_h };
            let mut params = vec![0u8; 16];
            params[0..4].copy_from_slice(&cx.to_le_bytes());
            params[4..8].copy_from_slice(&cy.to_le_bytes());
            params[8..12].copy_from_slice(&cw.to_le_bytes());
            params[12..16].copy_from_slice(&ch.to_le_bytes());

            let requested = Roi::new(rx, ry, rw, rh, 1.0);
            let roi_in = m.modify_roi_in(&params, &data, requested);
            let roi_out = m.modify_roi_out(&params, &data, roi_in);
            prop_assert!(roi_out.contains(&requested));
        }
    }
}
