//! Pipeline front-end (spec.md §4.9, C9): `create`/`render`/`render_region`,
//! module enable/disable, and per-module parameter get/set. `free` has no
//! Rust counterpart beyond `Drop`, which releases piece data the same way
//! the source's teardown path does.

use crate::buffer::PixelBuffer;
use crate::cache::ExecutionCache;
use crate::chroma::ChromaCoordinator;
use crate::descriptor::BufferDescriptor;
use crate::encode::{encode_backbuffer, RenderedResult};
use crate::engine;
use crate::error::{PipelineError, Result};
use crate::image::{Image, SourceData};
use crate::params::registry as param_ops;
use crate::params::ParamRegistry;
use crate::piece::Piece;
use crate::registry::{ModuleRegistry, DEFAULT_ENABLED};
use crate::roi::Roi;
pub use crate::shutdown::StopLevel;
use crate::shutdown::ShutdownFlag;
use std::sync::Mutex;

struct PipelineState<'img> {
    image: &'img Image,
    pieces: Vec<Piece>,
    param_registry: ParamRegistry,
    chroma: ChromaCoordinator,
    cache: ExecutionCache,
    initial_dsc: BufferDescriptor,
    base_buffer: Option<PixelBuffer>,
}

impl<'img> PipelineState<'img> {
    /// Lazily unpacks the source image into the working float buffer (spec.md
    /// §4.9 "lazy unpack"): raw mosaics are normalised by the white point into
    /// a 1-channel buffer, non-mosaic RGB is replicated into 4-channel RGBA
    /// with alpha 1.0. Computed once; later renders reuse it.
    fn ensure_base_buffer(&mut self) -> Result<()> {
        if self.base_buffer.is_some() {
            return Ok(());
        }
        let width = self.image.width;
        let height = self.image.height;
        let white_point = self.image.raw_white_point.max(1.0);

        let (dsc, buffer) = match &self.image.data {
            SourceData::Mosaic16(samples) => {
                let dsc = BufferDescriptor::for_raw(self.image.filters, self.image.raw_white_point);
                let mut buf = PixelBuffer::zeroed(width, height, dsc)?;
                for (dst, &src) in buf.as_mut_slice().iter_mut().zip(samples.iter()) {
                    *dst = src as f32 / white_point;
                }
                (dsc, buf)
            }
            SourceData::MosaicF32(samples) => {
                let dsc = BufferDescriptor::for_raw(self.image.filters, self.image.raw_white_point);
                let mut buf = PixelBuffer::zeroed(width, height, dsc)?;
                for (dst, &src) in buf.as_mut_slice().iter_mut().zip(samples.iter()) {
                    *dst = src / white_point;
                }
                (dsc, buf)
            }
            SourceData::Rgb(samples) => {
                let dsc = BufferDescriptor::for_rgb();
                let mut buf = PixelBuffer::zeroed(width, height, dsc)?;
                for (dst, src) in buf.as_mut_slice().chunks_exact_mut(4).zip(samples.chunks_exact(3)) {
                    dst[..3].copy_from_slice(src);
                    dst[3] = 1.0;
                }
                (dsc, buf)
            }
        };

        self.initial_dsc = dsc;
        self.base_buffer = Some(buffer);
        Ok(())
    }

    fn find_piece_mut(&mut self, op_name: &str) -> Result<&mut Piece> {
        self.pieces
            .iter_mut()
            .find(|p| p.op_name == op_name)
            .ok_or_else(|| PipelineError::NotFound(op_name.to_string()))
    }

    fn find_piece(&self, op_name: &str) -> Result<&Piece> {
        self.pieces
            .iter()
            .find(|p| p.op_name == op_name)
            .ok_or_else(|| PipelineError::NotFound(op_name.to_string()))
    }
}

/// An opaque handle over one render graph bound to a borrowed source image
/// (spec.md §3 "Pipeline"). `'img` ties the pipeline's lifetime to the image
/// it was created from, the same non-owning relationship the source
/// expresses through a raw pointer back into the host's image cache.
pub struct Pipeline<'img> {
    state: Mutex<PipelineState<'img>>,
    shutdown: ShutdownFlag,
}

impl<'img> Pipeline<'img> {
    /// Builds module instances and pieces in canonical iop-order and takes
    /// the initial descriptor snapshot. Does not allocate the working input
    /// buffer (spec.md §4.9 `create`).
    pub fn create(image: &'img Image) -> Result<Self> {
        image.validate().map_err(PipelineError::InvalidImage)?;

        let catalog = ModuleRegistry::builtin();
        let mut param_registry = ParamRegistry::new();
        let mut pieces = Vec::with_capacity(catalog.module_count());
        for (id, (op_name, iop_order, factory)) in catalog.canonical_order().enumerate() {
            let module = factory();
            param_registry.register(module.param_table())?;
            let mut piece = Piece::new(id, module, image, iop_order, 0);
            piece.enabled = DEFAULT_ENABLED.contains(&op_name);
            pieces.push(piece);
        }

        let state = PipelineState {
            image,
            pieces,
            param_registry,
            chroma: ChromaCoordinator::new(),
            cache: ExecutionCache::new(),
            initial_dsc: BufferDescriptor::zero(),
            base_buffer: None,
        };
        Ok(Pipeline {
            state: Mutex::new(state),
            shutdown: ShutdownFlag::new(),
        })
    }

    /// Requests cooperative cancellation of whatever render is currently in
    /// flight on this pipeline (spec.md §5 "Cancellation and timeouts").
    pub fn request_stop(&self, level: StopLevel) {
        self.shutdown.request_stop(level);
    }

    /// `render_region` over the full image extent (spec.md §4.9 `render`).
    pub fn render(&self, scale: f32) -> Result<RenderedResult> {
        let (width, height) = {
            let state = self.state.lock().unwrap();
            (state.image.width, state.image.height)
        };
        self.render_region(0, 0, width, height, scale)
    }

    /// Renders `(x, y, w, h)` at `scale` (spec.md §4.9 `render_region`): makes
    /// sure the working buffer exists, resets the descriptor, runs the
    /// engine, and encodes the result to sRGB-8 (spec.md §4.10). An empty
    /// requested region returns an empty result silently rather than an
    /// error (spec.md §6 `EmptyRegion`).
    pub fn render_region(&self, x: i64, y: i64, width: u32, height: u32, scale: f32) -> Result<RenderedResult> {
        if width == 0 || height == 0 {
            return Ok(RenderedResult::empty());
        }
        if !(scale > 0.0) {
            return Err(PipelineError::InvalidArgument(format!("scale must be positive, got {scale}")));
        }

        self.shutdown.reset();
        let mut state = self.state.lock().unwrap();
        state.ensure_base_buffer()?;

        let roi_out = Roi::new(x, y, width, height, scale);
        let initial_dsc = state.initial_dsc;
        let PipelineState {
            pieces,
            chroma,
            cache,
            base_buffer,
            ..
        } = &mut *state;
        let source = base_buffer.as_ref().expect("ensure_base_buffer just populated it");

        let rendered = engine::execute(pieces, chroma, cache, source, initial_dsc, roi_out, &self.shutdown)?;
        Ok(encode_backbuffer(rendered.as_slice(), rendered.width, rendered.height))
    }

    /// Enables or disables a module by name (spec.md §6 `enable_module`).
    /// Invalidates that piece's cache entries and marks it dirty so the next
    /// render re-runs `commit_params`.
    pub fn set_enabled(&self, op_name: &str, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let piece = state.find_piece_mut(op_name)?;
        let id = piece.id;
        if piece.enabled != enabled {
            piece.enabled = enabled;
            piece.mark_dirty();
        }
        state.cache.invalidate_piece(id);
        Ok(())
    }

    pub fn enable_module(&self, op_name: &str) -> Result<()> {
        self.set_enabled(op_name, true)
    }

    pub fn disable_module(&self, op_name: &str) -> Result<()> {
        self.set_enabled(op_name, false)
    }

    pub fn set_param_float(&self, op_name: &str, field: &str, value: f32) -> Result<f32> {
        let mut state = self.state.lock().unwrap();
        let desc = *state.param_registry.lookup(op_name, field)?;
        let piece = state.find_piece_mut(op_name)?;
        let clamped = param_ops::set_float(&mut piece.params, op_name, &desc, value)?;
        piece.mark_dirty();
        let id = piece.id;
        state.cache.invalidate_piece(id);
        Ok(clamped)
    }

    pub fn set_param_int(&self, op_name: &str, field: &str, value: i32) -> Result<i32> {
        let mut state = self.state.lock().unwrap();
        let desc = *state.param_registry.lookup(op_name, field)?;
        let piece = state.find_piece_mut(op_name)?;
        let clamped = param_ops::set_int(&mut piece.params, op_name, &desc, value)?;
        piece.mark_dirty();
        let id = piece.id;
        state.cache.invalidate_piece(id);
        Ok(clamped)
    }

    pub fn set_param_bool(&self, op_name: &str, field: &str, value: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let desc = *state.param_registry.lookup(op_name, field)?;
        let piece = state.find_piece_mut(op_name)?;
        param_ops::set_bool(&mut piece.params, op_name, &desc, value)?;
        piece.mark_dirty();
        let id = piece.id;
        state.cache.invalidate_piece(id);
        Ok(())
    }

    pub fn get_param_float(&self, op_name: &str, field: &str) -> Result<f32> {
        let state = self.state.lock().unwrap();
        let desc = state.param_registry.lookup(op_name, field)?;
        let piece = state.find_piece(op_name)?;
        param_ops::get_float(&piece.params, op_name, desc)
    }

    pub fn get_param_int(&self, op_name: &str, field: &str) -> Result<i32> {
        let state = self.state.lock().unwrap();
        let desc = state.param_registry.lookup(op_name, field)?;
        let piece = state.find_piece(op_name)?;
        param_ops::get_int(&piece.params, op_name, desc)
    }

    pub fn get_param_bool(&self, op_name: &str, field: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        let desc = state.param_registry.lookup(op_name, field)?;
        let piece = state.find_piece(op_name)?;
        param_ops::get_bool(&piece.params, op_name, desc)
    }

    /// Loads a host-persisted parameter blob (spec.md §6 "Parameter blob
    /// format"): walks the module's legacy-upgrade chain from `version` to
    /// its current version and, on success, installs the upgraded bytes as
    /// the piece's committed parameters. On `UnsupportedParamVersion` the
    /// blob is discarded and the piece keeps whatever parameters it already
    /// had (spec.md §4.3, §7 "the render proceeds"); the error is still
    /// returned so the host can report it.
    pub fn load_param_blob(&self, op_name: &str, bytes: Vec<u8>, version: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let piece = state.find_piece_mut(op_name)?;
        let target = piece.module.param_table().current_version;
        let module = &piece.module;
        let upgraded = param_ops::run_upgrade_chain(op_name, bytes, version, target, |b, v| {
            module.legacy_params(b, v)
        });
        match upgraded {
            Ok((bytes, _)) => {
                piece.params = bytes;
                piece.mark_dirty();
                let id = piece.id;
                state.cache.invalidate_piece(id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Filters;
    use crate::image::Orientation;

    fn flat_rgb_image(width: u32, height: u32, value: f32) -> Image {
        Image {
            width,
            height,
            data: SourceData::Rgb(vec![value; width as usize * height as usize * 3]),
            filters: Filters::None,
            raw_white_point: 1.0,
            as_shot_wb: [1.0; 4],
            camera_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            orientation: Orientation::Normal,
            monochrome: false,
        }
    }

    #[test]
    fn identity_passthrough_midgray_is_188() {
        let image = flat_rgb_image(4, 4, 0.5);
        let pipeline = Pipeline::create(&image).unwrap();
        for op in ["rawprepare", "demosaic", "colorin", "exposure", "colorout"] {
            pipeline.disable_module(op).unwrap();
        }
        let rendered = pipeline.render(1.0).unwrap();
        assert_eq!(rendered.width, 4);
        assert_eq!(rendered.height, 4);
        assert_eq!(rendered.stride, 16);
        for px in rendered.pixels.chunks_exact(4) {
            assert_eq!(px, &[188, 188, 188, 255]);
        }
    }

    #[test]
    fn two_renders_with_no_param_changes_are_byte_identical() {
        let image = flat_rgb_image(8, 8, 0.3);
        let pipeline = Pipeline::create(&image).unwrap();
        let first = pipeline.render_region(0, 0, 8, 8, 1.0).unwrap();
        let second = pipeline.render_region(0, 0, 8, 8, 1.0).unwrap();
        assert_eq!(first.pixels, second.pixels);
    }

    #[test]
    fn empty_region_is_silent() {
        let image = flat_rgb_image(4, 4, 0.5);
        let pipeline = Pipeline::create(&image).unwrap();
        let rendered = pipeline.render_region(0, 0, 0, 4, 1.0).unwrap();
        assert!(rendered.pixels.is_empty());
    }

    #[test]
    fn unknown_module_name_is_not_found() {
        let image = flat_rgb_image(4, 4, 0.5);
        let pipeline = Pipeline::create(&image).unwrap();
        assert!(matches!(pipeline.enable_module("nonexistent"), Err(PipelineError::NotFound(_))));
    }

    #[test]
    fn exposure_gain_changes_output_and_invalidates_cache() {
        let image = flat_rgb_image(4, 4, 0.25);
        let pipeline = Pipeline::create(&image).unwrap();
        pipeline.enable_module("exposure").unwrap();
        let before = pipeline.render(1.0).unwrap();
        pipeline.set_param_float("exposure", "exposure", 1.0).unwrap();
        let after = pipeline.render(1.0).unwrap();
        assert_ne!(before.pixels, after.pixels);
    }

    #[test]
    fn load_param_blob_runs_legacy_upgrade_and_commits() {
        let image = flat_rgb_image(4, 4, 0.5);
        let pipeline = Pipeline::create(&image).unwrap();
        let mut v1 = vec![0u8; 12];
        v1[0..4].copy_from_slice(&50.0f32.to_le_bytes());
        v1[4..8].copy_from_slice(&1.0f32.to_le_bytes());
        v1[8..12].copy_from_slice(&1.0f32.to_le_bytes());

        pipeline.load_param_blob("colorbalancergb", v1, 1).unwrap();
        let saturation = pipeline.get_param_float("colorbalancergb", "saturation").unwrap();
        assert_eq!(saturation, 1.0);
        let lift = pipeline.get_param_float("colorbalancergb", "lift").unwrap();
        assert!((lift - 0.5).abs() < 1e-6);
    }

    #[test]
    fn load_param_blob_rejects_unreachable_version() {
        let image = flat_rgb_image(4, 4, 0.5);
        let pipeline = Pipeline::create(&image).unwrap();
        let before = pipeline.get_param_float("colorbalancergb", "lift").unwrap();
        let err = pipeline.load_param_blob("colorbalancergb", vec![0u8; 4], 99);
        assert!(matches!(err, Err(PipelineError::UnsupportedParamVersion { .. })));
        let after = pipeline.get_param_float("colorbalancergb", "lift").unwrap();
        assert_eq!(before, after, "rejected blob must not disturb existing parameters");
    }
}
