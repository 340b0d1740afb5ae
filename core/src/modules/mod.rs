//! Concrete IOP modules (spec.md §1 "several IOP modules ... are reproduced
//! here as concrete instances of the module contract"). Their internal
//! color science is not part of the core spec except where it constrains
//! the engine (format-changing and geometric modules); the rest are kept
//! intentionally simple.

pub mod channelmixerrgb;
pub mod clipping;
pub mod colorbalancergb;
pub mod colorcalib;
pub mod colorin;
pub mod colorout;
pub mod crop;
pub mod demosaic;
pub mod exposure;
pub mod filmic;
pub mod levels;
pub mod rawprepare;
pub mod rgbcurve;
pub mod temperature;
pub mod vignette;
