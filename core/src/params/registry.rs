//! Generic, reflection-free get/set over per-module parameter byte buffers
//! (spec.md §4.3, C3).

use super::tables::{ParamDescriptor, ParamTable, ScalarType};
use crate::error::{PipelineError, Result};
use std::collections::HashMap;

/// Process-scoped catalog of parameter tables, keyed by operation name.
#[derive(Default)]
pub struct ParamRegistry {
    tables: HashMap<&'static str, ParamTable>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        ParamRegistry {
            tables: HashMap::new(),
        }
    }

    /// Registers a module's parameter table. A zero-size table is a
    /// registration error (spec.md §9 Open Questions #3): a module with no
    /// addressable parameters can never be configured, which is very likely
    /// a bug in the module, not an intentional design.
    pub fn register(&mut self, table: ParamTable) -> Result<()> {
        if table.struct_size == 0 {
            return Err(PipelineError::InvalidArgument(format!(
                "module {} declares a zero-size parameter struct",
                table.op
            )));
        }
        self.tables.insert(table.op, table);
        Ok(())
    }

    pub fn lookup(&self, op: &str, name: &str) -> Result<&ParamDescriptor> {
        self.table(op)?
            .lookup(name)
            .ok_or_else(|| PipelineError::NotFound(format!("{op}.{name}")))
    }

    pub fn count(&self, op: &str) -> Result<usize> {
        Ok(self.table(op)?.fields.len())
    }

    pub fn get(&self, op: &str, index: usize) -> Result<&ParamDescriptor> {
        self.table(op)?
            .fields
            .get(index)
            .ok_or_else(|| PipelineError::NotFound(format!("{op}[{index}]")))
    }

    pub fn params_size(&self, op: &str) -> Result<usize> {
        Ok(self.table(op)?.struct_size)
    }

    pub fn table(&self, op: &str) -> Result<&ParamTable> {
        self.tables
            .get(op)
            .ok_or_else(|| PipelineError::NotFound(op.to_string()))
    }

    /// Zero-initialised parameter buffer sized for `op` (spec.md §4.3
    /// "reads of uninitialised fields yield zero").
    pub fn zeroed_buffer(&self, op: &str) -> Result<Vec<u8>> {
        Ok(vec![0u8; self.params_size(op)?])
    }
}

fn check_bounds(desc: &ParamDescriptor, buf_len: usize, op: &str) -> Result<()> {
    if desc.offset + desc.size > buf_len {
        return Err(PipelineError::OutOfBounds {
            op: op.to_string(),
            field: desc.name.to_string(),
            reason: "offset + size exceeds parameter struct size".to_string(),
        });
    }
    Ok(())
}

fn type_error(op: &str, desc: &ParamDescriptor, expected: &'static str) -> PipelineError {
    PipelineError::TypeError {
        op: op.to_string(),
        field: desc.name.to_string(),
        expected,
        actual: desc.ty.name(),
    }
}

/// Writes `value` into `buf` at `desc`'s offset, soft-clamping (and warning)
/// if outside `[soft_min, soft_max]`. Returns the (possibly clamped) value
/// actually stored.
pub fn set_float(buf: &mut [u8], op: &str, desc: &ParamDescriptor, value: f32) -> Result<f32> {
    check_bounds(desc, buf.len(), op)?;
    if desc.ty != ScalarType::F32 {
        return Err(type_error(op, desc, "f32"));
    }
    let clamped = if value < desc.soft_min || value > desc.soft_max {
        let c = value.clamp(desc.soft_min, desc.soft_max);
        log::warn!(
            "{op}.{}: value {value} outside soft bounds [{}, {}], clamped to {c}",
            desc.name,
            desc.soft_min,
            desc.soft_max
        );
        c
    } else {
        value
    };
    buf[desc.offset..desc.offset + 4].copy_from_slice(&clamped.to_le_bytes());
    Ok(clamped)
}

pub fn get_float(buf: &[u8], op: &str, desc: &ParamDescriptor) -> Result<f32> {
    check_bounds(desc, buf.len(), op)?;
    if desc.ty != ScalarType::F32 {
        return Err(type_error(op, desc, "f32"));
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[desc.offset..desc.offset + 4]);
    Ok(f32::from_le_bytes(bytes))
}

pub fn set_int(buf: &mut [u8], op: &str, desc: &ParamDescriptor, value: i32) -> Result<i32> {
    check_bounds(desc, buf.len(), op)?;
    if desc.ty != ScalarType::I32 {
        return Err(type_error(op, desc, "i32"));
    }
    let clamped = if (value as f32) < desc.soft_min || (value as f32) > desc.soft_max {
        let c = (value as f32).clamp(desc.soft_min, desc.soft_max) as i32;
        log::warn!(
            "{op}.{}: value {value} outside soft bounds [{}, {}], clamped to {c}",
            desc.name,
            desc.soft_min,
            desc.soft_max
        );
        c
    } else {
        value
    };
    buf[desc.offset..desc.offset + 4].copy_from_slice(&clamped.to_le_bytes());
    Ok(clamped)
}

pub fn get_int(buf: &[u8], op: &str, desc: &ParamDescriptor) -> Result<i32> {
    check_bounds(desc, buf.len(), op)?;
    if desc.ty != ScalarType::I32 {
        return Err(type_error(op, desc, "i32"));
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[desc.offset..desc.offset + 4]);
    Ok(i32::from_le_bytes(bytes))
}

pub fn set_bool(buf: &mut [u8], op: &str, desc: &ParamDescriptor, value: bool) -> Result<()> {
    check_bounds(desc, buf.len(), op)?;
    if desc.ty != ScalarType::Bool {
        return Err(type_error(op, desc, "bool"));
    }
    buf[desc.offset] = value as u8;
    Ok(())
}

pub fn get_bool(buf: &[u8], op: &str, desc: &ParamDescriptor) -> Result<bool> {
    check_bounds(desc, buf.len(), op)?;
    if desc.ty != ScalarType::Bool {
        return Err(type_error(op, desc, "bool"));
    }
    Ok(buf[desc.offset] != 0)
}

/// Walks a module's legacy-upgrade chain until `target_version` is reached.
/// Each hop calls `upgrade_hop(bytes, version) -> (new_bytes, new_version)`;
/// failure at any hop yields `UnsupportedParamVersion` and the blob is
/// discarded (spec.md §4.3).
pub fn run_upgrade_chain(
    op: &str,
    mut bytes: Vec<u8>,
    mut version: u32,
    target_version: u32,
    mut upgrade_hop: impl FnMut(&[u8], u32) -> Option<(Vec<u8>, u32)>,
) -> Result<(Vec<u8>, u32)> {
    let from = version;
    while version < target_version {
        match upgrade_hop(&bytes, version) {
            Some((next_bytes, next_version)) => {
                bytes = next_bytes;
                version = next_version;
            }
            None => {
                return Err(PipelineError::UnsupportedParamVersion {
                    op: op.to_string(),
                    from,
                    to: target_version,
                });
            }
        }
    }
    if version > target_version {
        return Err(PipelineError::UnsupportedParamVersion {
            op: op.to_string(),
            from,
            to: target_version,
        });
    }
    Ok((bytes, version))
}
