//! Headless raw-photography rendering pipeline engine.
//!
//! Given a decoded source image (Bayer/X-Trans mosaic or RGB) and an ordered
//! chain of image-operation modules with user parameters, [`Pipeline`]
//! produces a rendered pixel buffer at a requested region and scale. The
//! engine does not decode raw files, manage display surfaces, or persist
//! state; it is a pure compute core meant to sit behind a thin front-end
//! (see the `cliobulk` binary crate for one).

mod alloc;
mod buffer;
mod cache;
mod chroma;
mod descriptor;
mod encode;
mod engine;
mod error;
mod image;
mod module;
mod modules;
mod params;
mod piece;
mod pipeline;
mod registry;
mod roi;
mod shutdown;
mod tiling;

pub use buffer::PixelBuffer;
pub use chroma::{CatClaim, ChromaCoordinator};
pub use descriptor::{BufferDescriptor, CfaColor, Channels, ColorSpace, DataType, Filters};
pub use encode::RenderedResult;
pub use error::{PieceId, PipelineError, Result};
pub use image::{Image, Orientation, SourceData};
pub use module::{IopModule, ModuleFlags, ModuleMeta, ProcessContext};
pub use params::{ParamDescriptor, ParamTable, ScalarType};
pub use pipeline::{Pipeline, StopLevel};
pub use roi::Roi;
pub use registry::ModuleRegistry;

/// Number of compiled-in modules (spec.md §6 `module_count`), process-scoped
/// and independent of any particular pipeline instance.
pub fn module_count() -> usize {
    ModuleRegistry::builtin().module_count()
}

/// Name of the `index`-th compiled-in module in canonical iop-order (spec.md
/// §6 `module_name`).
pub fn module_name(index: usize) -> Option<&'static str> {
    ModuleRegistry::builtin().module_name(index)
}
