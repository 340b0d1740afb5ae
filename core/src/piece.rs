//! Pipeline piece: the runtime binding of a module instance to one pipeline
//! (spec.md §3 "Pipeline piece", C6).

use crate::chroma::ChromaCoordinator;
use crate::error::Result;
use crate::image::Image;
use crate::module::IopModule;
use std::any::Any;

/// One module instance bound into a pipeline. Owns `data` (allocated by
/// `init_piece`, released when the pipeline is freed) and the current
/// committed-parameter snapshot (spec.md §3 "Pipeline piece").
pub struct Piece {
    pub id: usize,
    pub module: Box<dyn IopModule>,
    pub op_name: &'static str,
    pub iop_order: f32,
    pub instance: u32,
    pub multi_priority: u32,
    pub enabled: bool,
    pub params: Vec<u8>,
    pub default_params: Vec<u8>,
    pub blend_params: Option<Vec<u8>>,
    pub data: Box<dyn Any + Send + Sync>,
    /// Set whenever `params` changes via `set_param_*`; cleared after the
    /// next successful `commit_params` (spec.md §4.7 "invoke `commit_params`
    /// once per dirty snapshot").
    pub dirty: bool,
}

impl Piece {
    pub fn new(id: usize, module: Box<dyn IopModule>, image: &Image, iop_order: f32, instance: u32) -> Self {
        let default_params = module.default_params();
        let data = module.init_piece(image);
        let op_name = module.meta().op_name;
        Piece {
            id,
            module,
            op_name,
            iop_order,
            instance,
            multi_priority: 0,
            enabled: false,
            params: default_params.clone(),
            default_params,
            blend_params: None,
            data,
            dirty: true,
        }
    }

    /// Runs `commit_params` if this piece is dirty, clearing the flag on
    /// success (spec.md §4.7 step 2b).
    pub fn commit_if_dirty(&mut self, chroma: &mut ChromaCoordinator) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.module.commit_params(
            &self.params,
            self.data.as_mut(),
            chroma,
            self.id,
            self.iop_order,
            self.instance,
        )?;
        self.dirty = false;
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}
