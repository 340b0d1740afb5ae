//! Explicit per-module parameter descriptor tables (spec.md §3 "Parameter
//! descriptor", §9 "reflection over parameter structs -> explicit descriptor
//! tables"). Each module hand-writes its table; nothing is derived via
//! runtime introspection — the table *is* the schema.

/// Scalar type tag for a single parameter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    F32,
    I32,
    U32,
    Bool,
}

impl ScalarType {
    pub fn size_bytes(self) -> usize {
        match self {
            ScalarType::F32 | ScalarType::I32 | ScalarType::U32 => 4,
            ScalarType::Bool => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::F32 => "f32",
            ScalarType::I32 => "i32",
            ScalarType::U32 => "u32",
            ScalarType::Bool => "bool",
        }
    }
}

/// `{name, byte-offset, scalar type, size, soft-min, soft-max}` (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub offset: usize,
    pub ty: ScalarType,
    pub size: usize,
    pub soft_min: f32,
    pub soft_max: f32,
}

impl ParamDescriptor {
    pub const fn new(
        name: &'static str,
        offset: usize,
        ty: ScalarType,
        soft_min: f32,
        soft_max: f32,
    ) -> Self {
        let size = match ty {
            ScalarType::F32 | ScalarType::I32 | ScalarType::U32 => 4,
            ScalarType::Bool => 1,
        };
        ParamDescriptor {
            name,
            offset,
            ty,
            size,
            soft_min,
            soft_max,
        }
    }
}

/// A module's full parameter schema: its fields plus the total struct size
/// used to size the allocation (`params_size`, spec.md §4.3) and its current
/// version number (spec.md §3 "Versioned parameter struct").
#[derive(Debug, Clone)]
pub struct ParamTable {
    pub op: &'static str,
    pub current_version: u32,
    pub struct_size: usize,
    pub fields: Vec<ParamDescriptor>,
}

impl ParamTable {
    pub fn lookup(&self, name: &str) -> Option<&ParamDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}
