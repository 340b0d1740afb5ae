//! The pixel buffer that flows between pieces (spec.md §4.7 "allocate an
//! output buffer sized `out_roi.width x out_roi.height x channels x
//! sizeof(datatype)`, aligned to the platform vector width").

use crate::alloc::AlignedF32Buffer;
use crate::descriptor::BufferDescriptor;
use crate::error::Result;

/// A float32 pixel buffer tagged with its shape and descriptor. `uint16`
/// buffers (spec.md §3's `datatype` enum) are represented the same way: the
/// engine always computes in float internally and the datatype field on the
/// descriptor records only what a module's contract declares it expects,
/// matching the working-buffer-is-float design used throughout the pipeline
/// (spec.md §4.9 "lazy unpack ... normalised").
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub descriptor: BufferDescriptor,
    data: AlignedF32Buffer,
}

impl PixelBuffer {
    pub fn zeroed(width: u32, height: u32, descriptor: BufferDescriptor) -> Result<Self> {
        let channels = descriptor.channels as usize;
        let len = width as usize * height as usize * channels;
        let data = AlignedF32Buffer::zeroed(len, "pixel buffer")?;
        Ok(PixelBuffer {
            width,
            height,
            descriptor,
            data,
        })
    }

    pub fn channels(&self) -> usize {
        self.descriptor.channels as usize
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.data.as_mut_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Row-major pixel access, channel-interleaved.
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let c = self.channels();
        let idx = (y as usize * self.width as usize + x as usize) * c;
        &self.as_slice()[idx..idx + c]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [f32] {
        let c = self.channels();
        let idx = (y as usize * self.width as usize + x as usize) * c;
        &mut self.as_mut_slice()[idx..idx + c]
    }

    /// Extracts the sub-rectangle `region` (in the same absolute coordinate
    /// space as `origin`) out of a buffer whose top-left corner sits at
    /// `origin`. Used to carve a piece's declared `roi_in` out of whatever
    /// larger buffer the previous piece produced, and to carve per-tile
    /// inputs out of a piece's full `roi_in` buffer (spec.md §4.7 tiling).
    pub fn sub_region(&self, origin_x: i64, origin_y: i64, region: crate::roi::Roi) -> Result<PixelBuffer> {
        let mut out = PixelBuffer::zeroed(region.width, region.height, self.descriptor)?;
        let c = self.channels();
        for row in 0..region.height as i64 {
            let src_y = region.y - origin_y + row;
            if src_y < 0 || src_y >= self.height as i64 {
                continue;
            }
            for col in 0..region.width as i64 {
                let src_x = region.x - origin_x + col;
                if src_x < 0 || src_x >= self.width as i64 {
                    continue;
                }
                let src_idx = (src_y as usize * self.width as usize + src_x as usize) * c;
                let dst_idx = (row as usize * region.width as usize + col as usize) * c;
                out.as_mut_slice()[dst_idx..dst_idx + c].copy_from_slice(&self.as_slice()[src_idx..src_idx + c]);
            }
        }
        Ok(out)
    }

    /// Copies `tile` into `self` at the absolute position `tile_roi`,
    /// assuming `self`'s top-left corner sits at `(origin_x, origin_y)`.
    /// Used to stitch per-tile outputs back into one buffer (spec.md §4.7).
    pub fn blit(&mut self, origin_x: i64, origin_y: i64, tile_roi: crate::roi::Roi, tile: &PixelBuffer) {
        let c = self.channels();
        for row in 0..tile_roi.height as i64 {
            let dst_y = tile_roi.y - origin_y + row;
            if dst_y < 0 || dst_y >= self.height as i64 {
                continue;
            }
            for col in 0..tile_roi.width as i64 {
                let dst_x = tile_roi.x - origin_x + col;
                if dst_x < 0 || dst_x >= self.width as i64 {
                    continue;
                }
                let src_idx = (row as usize * tile.width as usize + col as usize) * c;
                let dst_idx = (dst_y as usize * self.width as usize + dst_x as usize) * c;
                self.as_mut_slice()[dst_idx..dst_idx + c].copy_from_slice(&tile.as_slice()[src_idx..src_idx + c]);
            }
        }
    }
}
