//! Reflection over SPIR-V shader modules: descriptor bindings, push
//! constants, entry points and their interfaces.
use spirv_headers as spv;

/// Unwraps an `Option` or evaluates the fallback expression, which
/// usually diverges.
macro_rules! try_opt {
    ($val:expr, $or:expr) => {
        match $val {
            Some(val) => val,
            None => $or,
        }
    };
}

mod classify;
mod data;
mod decoder;
mod diag;
mod error;
mod graph;
mod layout;
mod module;
mod node;
mod reader;
mod resolve;
#[cfg(test)]
mod testing;
mod types;

pub use data::*;
pub use decoder::{Decoder, Instruction, Instructions, Operands};
pub use diag::{Diagnostic, MissingDecoration};
pub use error::{Context, Error, ErrorKind, Result};
pub use graph::{
    Constant, ConstantValue, Decoration, Decorations, EntryPointDecl, ExecutionModeDecl,
    Graph, SourceDecl, StructMember, TypeNode, Variable,
};
pub use module::{parse_bytes, parse_words, HandleState, Module, ModuleHandle};
pub use node::ExtInstSet;
pub use reader::{Header, Version, MAX_VERSION};
pub use types::*;

pub use spv::{BuiltIn, Capability, Dim, ExecutionModel, StorageClass};

/// Result id of a SPIR-V instruction.
pub type Id = u32;

pub(crate) fn is_interface_storage(class: spv::StorageClass) -> bool {
    [spv::StorageClass::Input, spv::StorageClass::Output].contains(&class)
}
