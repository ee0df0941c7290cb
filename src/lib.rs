//! Decodes a WebAssembly core binary module and produces, for every
//! function body and constant expression, a flattened instruction stream
//! with every `block`/`loop`/`if` back-patched with the program counter it
//! branches to. No validation, no execution: this crate's job ends once a
//! caller has an in-memory [`Module`] whose control flow is resolved to
//! plain array indices.

mod config;
mod decode;
mod error;
mod flatten;
mod instr;
mod module;
mod reader;
mod types;

pub use config::DecoderConfig;
pub use error::DecodeError;
pub use instr::{
    BlockSignature, BulkOpcode, FlatInstr, InstrKind, MemArg, Opcode,
};
pub use module::Module;
pub use types::{
    DataMode, DataSegment, ElementItems, ElementMode, ElementSegment, Export, ExportKind,
    Function, FuncType, FuncTypeRef, Global, GlobalType, Import, ImportDesc, Limits, MemType,
    TableType, ValueType,
};
