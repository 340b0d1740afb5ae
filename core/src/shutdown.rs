//! Pipeline-scoped cancellation flag (spec.md §5 "Cancellation and
//! timeouts"). Two levels: complete the current piece then abort, or
//! complete the current tile then abort. A host may set this from a
//! watchdog thread; the engine only ever checks it between suspension
//! points, never pre-empting a `process` call mid-flight.

use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0;
const STOP_BETWEEN_NODES: u8 = 1;
const STOP_BETWEEN_TILES: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopLevel {
    BetweenNodes,
    BetweenTiles,
}

pub struct ShutdownFlag(AtomicU8);

impl ShutdownFlag {
    pub fn new() -> Self {
        ShutdownFlag(AtomicU8::new(RUNNING))
    }

    pub fn request_stop(&self, level: StopLevel) {
        let value = match level {
            StopLevel::BetweenNodes => STOP_BETWEEN_NODES,
            StopLevel::BetweenTiles => STOP_BETWEEN_TILES,
        };
        self.0.store(value, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(RUNNING, Ordering::SeqCst);
    }

    pub fn should_stop_between_nodes(&self) -> bool {
        self.0.load(Ordering::SeqCst) != RUNNING
    }

    pub fn should_stop_between_tiles(&self) -> bool {
        self.0.load(Ordering::SeqCst) == STOP_BETWEEN_TILES
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}
