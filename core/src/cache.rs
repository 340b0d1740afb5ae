//! Per-pipeline execution cache (spec.md §4.7 "Caching", C7).
//!
//! Keyed by `(piece-id, roi_in, roi_out, parameter-hash, descriptor-hash)`.
//! A hit skips `process` entirely and reuses the stored buffer. Since a
//! pipeline's renders already serialize on the pipeline mutex (spec.md §5),
//! "at most one concurrent execution per key" falls out for free — there is
//! never a second caller computing the same key while the first is still
//! running.

use crate::buffer::PixelBuffer;
use crate::descriptor::BufferDescriptor;
use crate::roi::Roi;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct RoiKey {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    scale_bits: u32,
}

impl From<Roi> for RoiKey {
    fn from(r: Roi) -> Self {
        RoiKey {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
            scale_bits: r.scale.to_bits(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    piece_id: usize,
    roi_in: RoiKey,
    roi_out: RoiKey,
    param_hash: u64,
    descriptor_hash: u64,
}

impl CacheKey {
    pub fn new(piece_id: usize, roi_in: Roi, roi_out: Roi, params: &[u8], descriptor: &BufferDescriptor) -> Self {
        CacheKey {
            piece_id,
            roi_in: roi_in.into(),
            roi_out: roi_out.into(),
            param_hash: hash_bytes(params),
            descriptor_hash: hash_descriptor(descriptor),
        }
    }
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

fn hash_descriptor(dsc: &BufferDescriptor) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    dsc.channels.hash(&mut hasher);
    dsc.datatype.hash(&mut hasher);
    dsc.colorspace.hash(&mut hasher);
    dsc.filters.hash(&mut hasher);
    for m in dsc.processed_maximum {
        m.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

struct CacheEntry {
    buffer: PixelBuffer,
}

/// Per-pipeline buffer cache. Not `Sync`-shared across threads on its own;
/// the pipeline serializes access via its own mutex (spec.md §5).
#[derive(Default)]
pub struct ExecutionCache {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl ExecutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&PixelBuffer> {
        self.entries.get(key).map(|e| &e.buffer)
    }

    pub fn insert(&mut self, key: CacheKey, buffer: PixelBuffer) {
        self.entries.insert(key, CacheEntry { buffer });
    }

    /// Invalidates every cached entry for the given piece: called when its
    /// parameters change, it is enabled/disabled, or the pipeline is freed
    /// (spec.md §4.7 "Cache entries are invalidated when...").
    pub fn invalidate_piece(&mut self, piece_id: usize) {
        self.entries.retain(|k, _| k.piece_id != piece_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
