//! `colorbalancergb`: simplified global lift/gamma/gain/saturation colour
//! grading. Full per-hue-range colour balance is out of scope (spec.md §1,
//! internal colour science is not part of the core); only the four global
//! controls are modelled.
//!
//! Carries a three-version parameter history (v1 -> v2 -> v3) so the legacy
//! upgrade chain of spec.md §4.3/§8 scenario 3 has a concrete fixture: v1
//! shipped without `saturation`; v2 added it (default neutral, 1.0); v3 kept
//! the layout but changed `lift`'s unit from percent to a normalised
//! fraction.

use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
use crate::params::{ParamDescriptor, ParamTable, ScalarType};
use rayon::prelude::*;
use std::any::Any;

const META: ModuleMeta = ModuleMeta {
    op_name: "colorbalancergb",
    default_colorspace: crate::descriptor::ColorSpace::Rgb,
    flags: ModuleFlags::empty(),
    default_group: "color",
    tiling_halo: 0,
};

const CURRENT_VERSION: u32 = 3;

const F_LIFT: ParamDescriptor = ParamDescriptor::new("lift", 0, ScalarType::F32, -0.5, 0.5);
const F_GAMMA: ParamDescriptor = ParamDescriptor::new("gamma", 4, ScalarType::F32, 0.25, 4.0);
const F_GAIN: ParamDescriptor = ParamDescriptor::new("gain", 8, ScalarType::F32, 0.0, 4.0);
const F_SATURATION: ParamDescriptor = ParamDescriptor::new("saturation", 12, ScalarType::F32, 0.0, 2.0);

struct PieceData;

pub struct ColorBalanceRgb;

impl IopModule for ColorBalanceRgb {
    fn meta(&self) -> &'static ModuleMeta {
        &META
    }

    fn param_table(&self) -> ParamTable {
        ParamTable {
            op: META.op_name,
            current_version: CURRENT_VERSION,
            struct_size: 16,
            fields: vec![F_LIFT, F_GAMMA, F_GAIN, F_SATURATION],
        }
    }

    fn default_params(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(&0.0f32.to_le_bytes());
        buf[4..8].copy_from_slice(&1.0f32.to_le_bytes());
        buf[8..12].copy_from_slice(&1.0f32.to_le_bytes());
        buf[12..16].copy_from_slice(&1.0f32.to_le_bytes());
        buf
    }

    fn init_piece(&self, _image: &Image) -> Box<dyn Any + Send + Sync> {
        Box::new(PieceData)
    }

    /// v1 (12 bytes: lift, gamma, gain) -> v2 (16 bytes: + saturation=1.0)
    /// -> v3 (16 bytes: lift rescaled from percent to a normalised fraction).
    fn legacy_params(&self, bytes: &[u8], old_version: u32) -> Option<(Vec<u8>, u32)> {
        match old_version {
            1 if bytes.len() == 12 => {
                let mut next = bytes.to_vec();
                next.extend_from_slice(&1.0f32.to_le_bytes());
                Some((next, 2))
            }
            2 if bytes.len() == 16 => {
                let mut next = bytes.to_vec();
                let lift_percent = f32::from_le_bytes(next[0..4].try_into().unwrap());
                next[0..4].copy_from_slice(&(lift_percent / 100.0).to_le_bytes());
                Some((next, 3))
            }
            _ => None,
        }
    }

    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        input
    }

    fn process(&self, ctx: ProcessContext) -> Result<()> {
        let lift = f32::from_le_bytes(ctx.params[0..4].try_into().unwrap());
        let gamma = f32::from_le_bytes(ctx.params[4..8].try_into().unwrap());
        let gain = f32::from_le_bytes(ctx.params[8..12].try_into().unwrap());
        let saturation = f32::from_le_bytes(ctx.params[12..16].try_into().unwrap());
        let inv_gamma = 1.0 / gamma;
        let channels = ctx.output.channels();
        let src = ctx.input.as_slice();
        let dst = ctx.output.as_mut_slice();
        dst.par_chunks_exact_mut(channels)
            .zip(src.par_chunks_exact(channels))
            .for_each(|(o, i)| {
                let mut graded = [0.0f32; 3];
                for c in 0..3.min(channels) {
                    let lifted = i[c] + lift * (1.0 - i[c]);
                    graded[c] = (lifted.max(0.0).powf(inv_gamma)) * gain;
                }
                let luma = 0.299 * graded[0] + 0.587 * graded[1] + 0.114 * graded[2];
                for c in 0..3.min(channels) {
                    o[c] = luma + (graded[c] - luma) * saturation;
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

    #[test]
    fn v1_to_current_upgrade_chain_yields_expected_saturation_and_lift() {
        let m = ColorBalanceRgb;
        let mut v1 = vec![0u8; 12];
        v1[0..4].copy_from_slice(&25.0f32.to_le_bytes()); // 25% lift
        v1[4..8].copy_from_slice(&1.0f32.to_le_bytes());
        v1[8..12].copy_from_slice(&1.0f32.to_le_bytes());

        let (bytes, version) = crate::params::registry::run_upgrade_chain(
            META.op_name,
            v1,
            1,
            CURRENT_VERSION,
            |b, v| m.legacy_params(b, v),
        )
        .unwrap();

        assert_eq!(version, CURRENT_VERSION);
        assert_eq!(bytes.len(), 16);
        let saturation = f32::from_le_bytes(bytes[12..16].try_into().unwrap());
        assert_eq!(saturation, 1.0);
        let lift = f32::from_le_bytes(bytes[0..4].try_into().unwrap());
        assert!((lift - 0.25).abs() < 1e-6);
    }

    #[test]
    fn upgrade_is_idempotent_on_current_version() {
        let m = ColorBalanceRgb;
        let current = m.default_params();
        let result = crate::params::registry::run_upgrade_chain(
            META.op_name,
            current.clone(),
            CURRENT_VERSION,
            CURRENT_VERSION,
            |b, v| m.legacy_params(b, v),
        )
        .unwrap();
        assert_eq!(result.0, current);
        assert_eq!(result.1, CURRENT_VERSION);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let m = ColorBalanceRgb;
        let bogus = vec![0u8; 4];
        let err = crate::params::registry::run_upgrade_chain(META.op_name, bogus, 0, CURRENT_VERSION, |b, v| {
            m.legacy_params(b, v)
        });
        assert!(err.is_err());
    }
}
