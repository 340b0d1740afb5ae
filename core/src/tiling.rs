//! Tiling support for modules that declare `ALLOW_TILING` (spec.md §4.7
//! "Tiling", C7). The engine partitions an oversized output ROI into tiles,
//! asks the module for each tile's input ROI individually (respecting its
//! own ROI contract), processes them independently, and stitches the
//! results back into one output buffer.

use crate::roi::Roi;

/// Per-pipeline memory budget for a single tile, in bytes. Conservative and
/// fixed; a production engine would derive this from available device
/// memory, which is out of scope here (spec.md §1, OpenCL orchestration is
/// an external collaborator).
pub const DEFAULT_TILE_BUDGET_BYTES: usize = 64 * 1024 * 1024;

pub const DEFAULT_TILE_DIM: u32 = 512;

/// Whether `roi` at `channels` float32 samples per pixel exceeds the given
/// per-tile memory budget.
pub fn exceeds_budget(roi: &Roi, channels: usize, budget_bytes: usize) -> bool {
    let bytes = roi.width as usize * roi.height as usize * channels * std::mem::size_of::<f32>();
    bytes > budget_bytes
}

/// Partitions `roi` into a grid of `tile_dim x tile_dim` (or smaller, at the
/// far edges) sub-rectangles covering it exactly with no overlap. Halos are
/// not added here: a tile's actual input requirement is derived per-tile by
/// calling the module's own `modify_roi_in` (spec.md §4.7 "Tiles respect the
/// module's ROI contract").
pub fn split_into_tiles(roi: Roi, tile_dim: u32) -> Vec<Roi> {
    if roi.is_empty() {
        return Vec::new();
    }
    let mut tiles = Vec::new();
    let mut y = 0u32;
    while y < roi.height {
        let h = tile_dim.min(roi.height - y);
        let mut x = 0u32;
        while x < roi.width {
            let w = tile_dim.min(roi.width - x);
            tiles.push(Roi {
                x: roi.x + x as i64,
                y: roi.y + y as i64,
                width: w,
                height: h,
                scale: roi.scale,
            });
            x += w;
        }
        y += h;
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_cover_the_requested_roi_exactly() {
        let roi = Roi::new(0, 0, 1000, 700, 1.0);
        let tiles = split_into_tiles(roi, 512);
        let total: u64 = tiles.iter().map(|t| t.width as u64 * t.height as u64).sum();
        assert_eq!(total, roi.width as u64 * roi.height as u64);
        for t in &tiles {
            assert!(t.width <= 512 && t.height <= 512);
        }
    }

    #[test]
    fn empty_roi_yields_no_tiles() {
        assert!(split_into_tiles(Roi::new(0, 0, 0, 10, 1.0), 512).is_empty());
    }
}
