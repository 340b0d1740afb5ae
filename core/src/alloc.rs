//! Aligned pixel-buffer allocation (spec.md §5 "Allocation discipline").
//!
//! All pixel buffers are allocated with alignment equal to the platform's
//! preferred vector width. Allocation failure is a surfaced `OutOfMemory`
//! error, not a panic, unlike a plain `Vec::with_capacity` which aborts the
//! process via the global alloc-error handler.

use crate::error::{PipelineError, Result};
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Typical preferred vector width on the platforms this engine targets
/// (AVX-512 cache-line granularity); see spec.md §5.
pub const VECTOR_ALIGN: usize = 64;

/// An owned, 64-byte-aligned buffer of `f32` samples, zero-initialised.
pub struct AlignedF32Buffer {
    ptr: NonNull<f32>,
    len: usize,
    layout: Layout,
}

// SAFETY: the buffer owns its allocation exclusively; it is moved, not
// shared, across threads and contains only plain f32 data.
unsafe impl Send for AlignedF32Buffer {}
unsafe impl Sync for AlignedF32Buffer {}

impl AlignedF32Buffer {
    /// Allocates `len` zeroed `f32`s aligned to `VECTOR_ALIGN`. Returns
    /// `OutOfMemory` instead of aborting when the allocator cannot satisfy
    /// the request.
    pub fn zeroed(len: usize, context: &str) -> Result<Self> {
        if len == 0 {
            // A zero-size allocation still needs a valid, aligned, dangling
            // pointer; Layout::array rejects size 0 with alignment fine, but
            // to keep `as_slice` well-defined we special-case it.
            return Ok(AlignedF32Buffer {
                ptr: NonNull::dangling(),
                len: 0,
                layout: Layout::from_size_align(0, VECTOR_ALIGN).unwrap(),
            });
        }
        let byte_len = len
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| PipelineError::OutOfMemory {
                context: context.to_string(),
            })?;
        let layout = Layout::from_size_align(byte_len, VECTOR_ALIGN).map_err(|_| {
            PipelineError::OutOfMemory {
                context: context.to_string(),
            }
        })?;
        // SAFETY: layout has non-zero size, checked above.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut f32).ok_or_else(|| PipelineError::OutOfMemory {
            context: context.to_string(),
        })?;
        Ok(AlignedF32Buffer { ptr, len, layout })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f32] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: `ptr` is valid for `len` initialised f32 elements.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: exclusive access via `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Clone for AlignedF32Buffer {
    fn clone(&self) -> Self {
        let mut new = AlignedF32Buffer::zeroed(self.len, "clone").unwrap_or_else(|_| {
            panic!("allocation failure during clone of {} samples", self.len)
        });
        new.as_mut_slice().copy_from_slice(self.as_slice());
        new
    }
}

impl std::fmt::Debug for AlignedF32Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedF32Buffer").field("len", &self.len).finish()
    }
}

impl Drop for AlignedF32Buffer {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: `ptr`/`layout` match the allocation made in `zeroed`.
            unsafe { alloc::dealloc(self.ptr.as_ptr() as *mut u8, self.layout) };
        }
    }
}
