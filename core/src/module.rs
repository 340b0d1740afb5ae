//! The IOP module contract (spec.md §4.4, C4).
//!
//! Per design notes §9, the callback vtable of the source is replaced here
//! by a polymorphic trait (`IopModule`) over the capability set `{init,
//! init_piece, commit_params, modify_roi_in, modify_roi_out, output_format,
//! process, cleanup_piece}`, preferred for extensibility over a tagged
//! union of module kinds.

use crate::buffer::PixelBuffer;
use crate::chroma::ChromaCoordinator;
use crate::descriptor::BufferDescriptor;
use crate::error::Result;
use crate::image::Image;
use crate::params::ParamTable;
use crate::roi::Roi;
use std::any::Any;

bitflags::bitflags! {
    /// Capability/behaviour bits declared by a module (spec.md §3 "Module").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModuleFlags: u32 {
        const SUPPORTS_BLENDING = 1 << 0;
        const ALLOW_TILING      = 1 << 1;
        const ONE_INSTANCE      = 1 << 2;
        const DEPRECATED        = 1 << 3;
        /// Output ROI is a strict function of input ROI (needed by the
        /// crop/clipping family per spec.md §4.4).
        const ROI_STRICT        = 1 << 4;
    }
}

/// Static, compiled-in metadata for one module kind (spec.md §3 "Module").
#[derive(Debug, Clone)]
pub struct ModuleMeta {
    pub op_name: &'static str,
    pub default_colorspace: crate::descriptor::ColorSpace,
    pub flags: ModuleFlags,
    pub default_group: &'static str,
    /// Tiling halo in pixels; an explicit property rather than inferred
    /// from module kind (spec.md §9 Open Questions #4).
    pub tiling_halo: u32,
}

/// Per-call context handed to `IopModule::process`.
pub struct ProcessContext<'a> {
    pub input: &'a PixelBuffer,
    pub output: &'a mut PixelBuffer,
    pub roi_in: Roi,
    pub roi_out: Roi,
    pub params: &'a [u8],
    pub piece_data: &'a mut dyn Any,
}

/// The capability set every image-operation module implements.
///
/// Default implementations model the source's "identity by default" for the
/// geometric/format callbacks (spec.md §4.4 table).
pub trait IopModule: Send + Sync {
    fn meta(&self) -> &'static ModuleMeta;

    /// Module's current parameter-struct version and schema (spec.md §4.3).
    fn param_table(&self) -> ParamTable;

    /// Default parameter bytes for a freshly created instance.
    fn default_params(&self) -> Vec<u8>;

    /// Allocates per-piece data at piece creation (spec.md §4.4 `init_piece`).
    /// Modules that need source-image metadata (as-shot white balance, the
    /// camera matrix, the sensor's filter pattern) capture it here since
    /// `process` only ever sees pixel buffers and ROIs.
    fn init_piece(&self, image: &Image) -> Box<dyn Any + Send + Sync>;

    /// Upgrades a legacy parameter blob one version forward, or returns
    /// `None` if this module cannot upgrade from `old_version` (spec.md
    /// §4.3). The registry calls this repeatedly until the current version
    /// is reached.
    fn legacy_params(&self, _bytes: &[u8], _old_version: u32) -> Option<(Vec<u8>, u32)> {
        None
    }

    /// Translates committed user parameters into process-ready form inside
    /// `piece_data`; may also interact with the chromatic-adaptation
    /// coordinator (spec.md §4.8).
    fn commit_params(
        &self,
        _params: &[u8],
        _piece_data: &mut dyn Any,
        _chroma: &mut ChromaCoordinator,
        _piece_id: usize,
        _iop_order: f32,
        _instance: u32,
    ) -> Result<()> {
        Ok(())
    }

    /// Given the upstream output region, compute the region this module
    /// will emit. Must round outward (spec.md §4.2). Geometric modules read
    /// their committed parameters and per-piece data (e.g. the full image
    /// extent captured at `init_piece`) to do this; identity by default.
    fn modify_roi_out(&self, _params: &[u8], _piece_data: &dyn Any, roi_in: Roi) -> Roi {
        roi_in
    }

    /// Given a requested output region, compute the minimal input region
    /// sufficient to produce it. Must round outward (spec.md §4.2).
    fn modify_roi_in(&self, _params: &[u8], _piece_data: &dyn Any, roi_out: Roi) -> Roi {
        roi_out
    }

    /// Mutates the descriptor to reflect this module's output format.
    /// Identity by default; format-changing modules (rawprepare, demosaic)
    /// override this (spec.md §4.1).
    fn output_format(&self, input: BufferDescriptor) -> BufferDescriptor {
        input
    }

    /// The pixel kernel. Must preserve alpha when emitting 4-channel output.
    fn process(&self, ctx: ProcessContext) -> Result<()>;

    /// Releases piece data at piece teardown (spec.md §4.4 `cleanup_piece`).
    /// Default drop is sufficient for most modules; overridden only when a
    /// module needs explicit teardown side effects.
    fn cleanup_piece(&self, _data: Box<dyn Any + Send + Sync>) {}
}
