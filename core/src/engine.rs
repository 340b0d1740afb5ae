//! The execution engine (spec.md §4.7, C7): the backward region-of-interest
//! pass, forward execution with per-piece caching and tiling, and cooperative
//! cancellation.

use crate::buffer::PixelBuffer;
use crate::cache::{CacheKey, ExecutionCache};
use crate::chroma::ChromaCoordinator;
use crate::descriptor::BufferDescriptor;
use crate::error::{PipelineError, Result};
use crate::module::{ModuleFlags, ProcessContext};
use crate::piece::Piece;
use crate::roi::Roi;
use crate::shutdown::ShutdownFlag;
use crate::tiling;

/// Runs every enabled piece in order, producing the buffer for `roi_out`.
///
/// `source` is the pipeline's base working buffer (origin `(0, 0)`,
/// `initial_dsc` describing its shape). Disabled pieces and pieces whose
/// declared output ROI turns out degenerate (spec.md §4.2 failure modes) are
/// passed through unchanged for this render only; their `enabled` flag on
/// the piece itself is not touched.
pub fn execute(
    pieces: &mut [Piece],
    chroma: &mut ChromaCoordinator,
    cache: &mut ExecutionCache,
    source: &PixelBuffer,
    initial_dsc: BufferDescriptor,
    roi_out: Roi,
    shutdown: &ShutdownFlag,
) -> Result<PixelBuffer> {
    chroma.reset_claim();

    for piece in pieces.iter_mut() {
        if piece.enabled {
            piece
                .commit_if_dirty(chroma)
                .map_err(|e| PipelineError::PipelineFailed {
                    piece_id: piece.id,
                    cause: e.to_string(),
                })?;
        }
    }

    // A piece whose committed parameters turn out to collapse the ROI below
    // the minimum size (spec.md §4.2) is treated as disabled for this render.
    // One corrective pass is run: compute the ROI chain assuming every
    // originally-enabled piece stays enabled, flag any that go degenerate,
    // then recompute the chain once more with those excluded. Cascades of a
    // degenerate piece un-degenerating a downstream one are not chased to a
    // fixed point; this matches the engine's bounded-work design (spec.md §5).
    let mut effective_enabled: Vec<bool> = pieces.iter().map(|p| p.enabled).collect();
    let (rois, _roi_outs, _) = backward_pass(pieces, &effective_enabled, roi_out);
    for (idx, piece) in pieces.iter().enumerate() {
        if !effective_enabled[idx] {
            continue;
        }
        let declared = piece.module.modify_roi_out(&piece.params, piece.data.as_ref(), rois[idx]);
        if declared.is_degenerate() {
            log::warn!(
                "piece {} ({}) would produce a degenerate region {:?}; disabling for this render",
                piece.id,
                piece.op_name,
                declared
            );
            effective_enabled[idx] = false;
        }
    }
    let (rois, roi_outs, base_roi_in) = backward_pass(pieces, &effective_enabled, roi_out);

    let mut descriptor = initial_dsc;
    let mut current = source
        .sub_region(0, 0, base_roi_in)
        .map_err(|e| PipelineError::PipelineFailed {
            piece_id: 0,
            cause: e.to_string(),
        })?;

    for (idx, piece) in pieces.iter_mut().enumerate() {
        if shutdown.should_stop_between_nodes() {
            return Err(PipelineError::Cancelled);
        }
        if !effective_enabled[idx] {
            continue;
        }

        let roi_in = rois[idx];
        let roi_out_piece = roi_outs[idx];
        let key = CacheKey::new(piece.id, roi_in, roi_out_piece, &piece.params, &descriptor);

        if let Some(cached) = cache.get(&key) {
            descriptor = cached.descriptor;
            current = cached.clone();
            continue;
        }

        let out_descriptor = piece.module.output_format(descriptor);
        let channels = out_descriptor.channels as usize;

        let output = if piece.module.meta().flags.contains(ModuleFlags::ALLOW_TILING)
            && tiling::exceeds_budget(&roi_out_piece, channels, tiling::DEFAULT_TILE_BUDGET_BYTES)
        {
            process_tiled(piece, &current, roi_in, roi_out_piece, out_descriptor, shutdown)?
        } else {
            let mut out_buf = PixelBuffer::zeroed(roi_out_piece.width, roi_out_piece.height, out_descriptor).map_err(|e| {
                PipelineError::PipelineFailed {
                    piece_id: piece.id,
                    cause: e.to_string(),
                }
            })?;
            piece
                .module
                .process(ProcessContext {
                    input: &current,
                    output: &mut out_buf,
                    roi_in,
                    roi_out: roi_out_piece,
                    params: &piece.params,
                    piece_data: piece.data.as_mut(),
                })
                .map_err(|e| PipelineError::PipelineFailed {
                    piece_id: piece.id,
                    cause: e.to_string(),
                })?;
            out_buf
        };

        cache.insert(key, output.clone());
        descriptor = output.descriptor;
        current = output;
    }

    Ok(current)
}

/// Iterates pieces back to front, turning the requested output region into
/// each piece's `(roi_in, roi_out)` pair, and finally the region the engine
/// must extract from the base source buffer. `enabled` overrides
/// `piece.enabled` so degenerate pieces can be excluded without mutating the
/// piece itself.
fn backward_pass(pieces: &[Piece], enabled: &[bool], roi_out: Roi) -> (Vec<Roi>, Vec<Roi>, Roi) {
    let mut rois = vec![roi_out; pieces.len()];
    let mut roi_outs = vec![roi_out; pieces.len()];
    let mut next_roi_out = roi_out;
    for (idx, piece) in pieces.iter().enumerate().rev() {
        roi_outs[idx] = next_roi_out;
        let roi_in = if enabled[idx] {
            piece.module.modify_roi_in(&piece.params, piece.data.as_ref(), next_roi_out)
        } else {
            next_roi_out
        };
        rois[idx] = roi_in;
        next_roi_out = roi_in;
    }
    (rois, roi_outs, next_roi_out)
}

/// Partitions `roi_out` into tiles, asks the piece for each tile's own input
/// requirement, grows it by the module's declared halo, and stitches the
/// per-tile outputs back together (spec.md §4.7 "Tiling").
fn process_tiled(
    piece: &mut Piece,
    input: &PixelBuffer,
    roi_in: Roi,
    roi_out: Roi,
    out_descriptor: BufferDescriptor,
    shutdown: &ShutdownFlag,
) -> Result<PixelBuffer> {
    let halo = piece.module.meta().tiling_halo;
    let mut output = PixelBuffer::zeroed(roi_out.width, roi_out.height, out_descriptor).map_err(|e| PipelineError::PipelineFailed {
        piece_id: piece.id,
        cause: e.to_string(),
    })?;

    for tile_roi_out in tiling::split_into_tiles(roi_out, tiling::DEFAULT_TILE_DIM) {
        if shutdown.should_stop_between_tiles() {
            return Err(PipelineError::Cancelled);
        }
        let tile_roi_in = piece
            .module
            .modify_roi_in(&piece.params, piece.data.as_ref(), tile_roi_out)
            .grow(halo);
        let tile_input = input.sub_region(roi_in.x, roi_in.y, tile_roi_in).map_err(|e| PipelineError::PipelineFailed {
            piece_id: piece.id,
            cause: e.to_string(),
        })?;
        let mut tile_output = PixelBuffer::zeroed(tile_roi_out.width, tile_roi_out.height, out_descriptor).map_err(|e| {
            PipelineError::PipelineFailed {
                piece_id: piece.id,
                cause: e.to_string(),
            }
        })?;
        piece
            .module
            .process(ProcessContext {
                input: &tile_input,
                output: &mut tile_output,
                roi_in: tile_roi_in,
                roi_out: tile_roi_out,
                params: &piece.params,
                piece_data: piece.data.as_mut(),
            })
            .map_err(|e| PipelineError::PipelineFailed {
                piece_id: piece.id,
                cause: e.to_string(),
            })?;
        output.blit(roi_out.x, roi_out.y, tile_roi_out, &tile_output);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ColorSpace;
    use crate::image::{Image, Orientation, SourceData};
    use crate::module::{IopModule, ModuleMeta};
    use crate::params::{ParamTable};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static PROCESS_CALLS: AtomicUsize = AtomicUsize::new(0);

    const COUNTING_META: ModuleMeta = ModuleMeta {
        op_name: "counting_test_module",
        default_colorspace: ColorSpace::Rgb,
        flags: ModuleFlags::empty(),
        default_group: "basic",
        tiling_halo: 0,
    };

    /// Doubles every sample; counts how many times `process` actually runs so
    /// cache-hit behaviour can be asserted on.
    struct CountingDouble;

    impl IopModule for CountingDouble {
        fn meta(&self) -> &'static ModuleMeta {
            &COUNTING_META
        }

        fn param_table(&self) -> ParamTable {
            ParamTable {
                op: COUNTING_META.op_name,
                current_version: 1,
                struct_size: 0,
                fields: vec![],
            }
        }

        fn default_params(&self) -> Vec<u8> {
            Vec::new()
        }

        fn init_piece(&self, _image: &Image) -> Box<dyn Any + Send + Sync> {
            Box::new(())
        }

        fn process(&self, ctx: ProcessContext) -> Result<()> {
            PROCESS_CALLS.fetch_add(1, Ordering::SeqCst);
            for (i, o) in ctx.input.as_slice().iter().zip(ctx.output.as_mut_slice().iter_mut()) {
                *o = i * 2.0;
            }
            Ok(())
        }
    }

    fn test_image() -> Image {
        Image {
            width: 2,
            height: 2,
            data: SourceData::Rgb(vec![0.0; 12]),
            filters: crate::descriptor::Filters::None,
            raw_white_point: 1.0,
            as_shot_wb: [1.0; 4],
            camera_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            orientation: Orientation::Normal,
            monochrome: false,
        }
    }

    #[test]
    fn disabled_piece_passes_its_input_through_unchanged() {
        let image = test_image();
        let mut piece = Piece::new(0, Box::new(CountingDouble), &image, 10.0, 0);
        piece.enabled = false;
        let mut pieces = vec![piece];
        let mut chroma = ChromaCoordinator::new();
        let mut cache = ExecutionCache::new();
        let dsc = BufferDescriptor::for_rgb();
        let mut source = PixelBuffer::zeroed(2, 2, dsc).unwrap();
        source.as_mut_slice().copy_from_slice(&[0.1; 16]);
        let roi = Roi::new(0, 0, 2, 2, 1.0);
        let shutdown = ShutdownFlag::new();

        let result = execute(&mut pieces, &mut chroma, &mut cache, &source, dsc, roi, &shutdown).unwrap();
        assert_eq!(result.as_slice(), source.as_slice());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn enabled_piece_runs_once_then_hits_cache() {
        let calls_before = PROCESS_CALLS.load(Ordering::SeqCst);
        let image = test_image();
        let mut piece = Piece::new(0, Box::new(CountingDouble), &image, 10.0, 0);
        piece.enabled = true;
        let mut pieces = vec![piece];
        let mut chroma = ChromaCoordinator::new();
        let mut cache = ExecutionCache::new();
        let dsc = BufferDescriptor::for_rgb();
        let mut source = PixelBuffer::zeroed(2, 2, dsc).unwrap();
        source.as_mut_slice().copy_from_slice(&[0.25; 16]);
        let roi = Roi::new(0, 0, 2, 2, 1.0);
        let shutdown = ShutdownFlag::new();

        let result = execute(&mut pieces, &mut chroma, &mut cache, &source, dsc, roi, &shutdown).unwrap();
        assert!(result.as_slice().iter().all(|&v| (v - 0.5).abs() < 1e-6));
        assert_eq!(cache.len(), 1);
        assert_eq!(PROCESS_CALLS.load(Ordering::SeqCst), calls_before + 1);

        pieces[0].dirty = false;
        let result2 = execute(&mut pieces, &mut chroma, &mut cache, &source, dsc, roi, &shutdown).unwrap();
        assert_eq!(result2.as_slice(), result.as_slice());
        assert_eq!(PROCESS_CALLS.load(Ordering::SeqCst), calls_before + 1, "cache hit must not re-run process");
    }

    #[test]
    fn cancellation_between_pieces_is_observed() {
        let image = test_image();
        let mut piece = Piece::new(0, Box::new(CountingDouble), &image, 10.0, 0);
        piece.enabled = true;
        let mut pieces = vec![piece];
        let mut chroma = ChromaCoordinator::new();
        let mut cache = ExecutionCache::new();
        let dsc = BufferDescriptor::for_rgb();
        let source = PixelBuffer::zeroed(2, 2, dsc).unwrap();
        let roi = Roi::new(0, 0, 2, 2, 1.0);
        let shutdown = ShutdownFlag::new();
        shutdown.request_stop(crate::shutdown::StopLevel::BetweenNodes);

        let result = execute(&mut pieces, &mut chroma, &mut cache, &source, dsc, roi, &shutdown);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
