pub mod registry;
pub mod tables;

pub use registry::ParamRegistry;
pub use tables::{ParamDescriptor, ParamTable, ScalarType};
