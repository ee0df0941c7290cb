use doc_comment::doc_comment;

use crate::error::DecodeError;
use crate::instr::FlatInstr;

/// A WebAssembly value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    V128,
    Funcref,
    Externref,
}

macro_rules! impl_value_type_tag {
    ($($tag:literal => $variant:ident),* $(,)?) => {
        doc_comment! {
            "Byte encoding of a `ValueType`, per the WebAssembly core binary format.",
            impl ValueType {
                pub(crate) fn from_tag(tag: u8, offset: usize) -> Result<Self, DecodeError> {
                    match tag {
                        $($tag => Ok(ValueType::$variant),)*
                        _ => Err(DecodeError::MalformedFuncType { offset, found: tag }),
                    }
                }

                pub(crate) fn to_tag(self) -> u8 {
                    match self {
                        $(ValueType::$variant => $tag,)*
                    }
                }
            }
        }
    };
}

impl_value_type_tag! {
    0x7f => I32,
    0x7e => I64,
    0x7d => F32,
    0x7c => F64,
    0x7b => V128,
    0x70 => Funcref,
    0x6f => Externref,
}

/// `min`/`max` bounds on a table or memory, as encoded by the `limits`
/// production.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

/// A function signature: `(params) -> (results)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

/// A table's element type and size bounds.
#[derive(Clone, Debug)]
pub struct TableType {
    pub elem_type: ValueType,
    pub limits: Limits,
}

/// A linear memory's size bounds, in units of 64 KiB pages.
#[derive(Clone, Copy, Debug)]
pub struct MemType {
    pub limits: Limits,
}

/// A global's value type and mutability.
#[derive(Clone, Copy, Debug)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

/// Index into the type section, pre fix-up, or the function type it resolves
/// to, post fix-up. See [`crate::module::Module::read`]'s fix-up pass.
#[derive(Clone, Debug)]
pub enum FuncTypeRef {
    Index(u32),
    Resolved(FuncType),
}

/// What an import provides: a function (by type), or a table/memory/global
/// (by inline type description).
#[derive(Clone, Debug)]
pub enum ImportDesc {
    Func(FuncTypeRef),
    Table(TableType),
    Mem(MemType),
    Global(GlobalType),
}

/// A single entry of the import section.
#[derive(Clone, Debug)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

/// What an export entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    Func,
    Table,
    Mem,
    Global,
}

impl ExportKind {
    pub(crate) fn from_tag(tag: u8, offset: usize) -> Result<Self, DecodeError> {
        match tag {
            0x00 => Ok(ExportKind::Func),
            0x01 => Ok(ExportKind::Table),
            0x02 => Ok(ExportKind::Mem),
            0x03 => Ok(ExportKind::Global),
            _ => Err(DecodeError::UnknownSubEncoding {
                offset,
                entity: "export kind",
                tag: tag as u32,
            }),
        }
    }
}

/// A single entry of the export section.
#[derive(Clone, Debug)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// Initialization mode of an element segment.
#[derive(Clone, Debug)]
pub enum ElementMode {
    /// Copied into a table at instantiation time.
    Active { table_index: u32, offset: Vec<FlatInstr> },
    /// Initialized on demand via `table.init`, never written automatically.
    Passive,
    /// Forward-declared only; never written to a table.
    Declarative,
}

/// The payload of an element segment: either function indices directly, or
/// full constant expressions (used when `elem_type` is `externref`, or to
/// carry `ref.func`/`ref.null` forms for `funcref`).
#[derive(Clone, Debug)]
pub enum ElementItems {
    FuncIndices(Vec<u32>),
    Exprs(Vec<Vec<FlatInstr>>),
}

/// A single entry of the element section.
#[derive(Clone, Debug)]
pub struct ElementSegment {
    pub elem_type: ValueType,
    pub mode: ElementMode,
    pub items: ElementItems,
}

/// Initialization mode of a data segment.
#[derive(Clone, Debug)]
pub enum DataMode {
    Active { mem_index: u32, offset: Vec<FlatInstr> },
    Passive,
}

/// A single entry of the data section.
#[derive(Clone, Debug)]
pub struct DataSegment {
    pub mode: DataMode,
    pub bytes: Vec<u8>,
}

/// A single entry of the global section: its type plus constant
/// initializer expression.
#[derive(Clone, Debug)]
pub struct Global {
    pub ty: GlobalType,
    pub init: Vec<FlatInstr>,
}

/// A defined function: its declared type, its locals (already expanded from
/// the code section's run-length encoding), and its flattened body.
///
/// Populated in two steps: the function section supplies `type_index`, the
/// code section supplies `locals` and `body`; [`crate::module::Module::read`]
/// merges the two during fix-up.
#[derive(Clone, Debug)]
pub struct Function {
    pub type_index: u32,
    pub locals: Vec<ValueType>,
    pub body: Vec<FlatInstr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_from_tag() {
        assert_eq!(ValueType::from_tag(0x7f, 0).unwrap(), ValueType::I32);
        assert_eq!(ValueType::from_tag(0x6f, 0).unwrap(), ValueType::Externref);
    }

    #[test]
    fn test_value_type_from_tag_invalid() {
        assert!(ValueType::from_tag(0x00, 0).is_err());
    }

    #[test]
    fn test_export_kind_from_tag() {
        assert_eq!(ExportKind::from_tag(0x03, 0).unwrap(), ExportKind::Global);
        assert!(ExportKind::from_tag(0x04, 0).is_err());
    }
}
