//! The top-level decoded module and its construction pipeline: read the
//! preamble, dispatch every section, then fix up the handful of places
//! where the binary format splits one logical entity across two sections
//! (imported function types; defined functions).

use anyhow::Result;

use crate::config::DecoderConfig;
use crate::decode::{self, SectionPayload};
use crate::error::DecodeError;
use crate::reader::ByteReader;
use crate::types::{
    DataSegment, ElementSegment, Export, Function, FuncType, FuncTypeRef, Global, Import,
    ImportDesc, MemType, TableType,
};

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
const SUPPORTED_VERSION: u32 = 1;

/// A fully decoded WebAssembly module: every section's entities, with
/// imported function types resolved and the function/code sections merged
/// into one list of [`Function`]s.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
}

impl Module {
    /// Decode `bytes` using the default [`DecoderConfig`].
    pub fn read(bytes: &[u8]) -> Result<Module> {
        Module::read_with_config(bytes, &DecoderConfig::default())
    }

    /// Decode `bytes`, enforcing the section-size ceiling in `config`.
    pub fn read_with_config(bytes: &[u8], config: &DecoderConfig) -> Result<Module> {
        let mut reader = ByteReader::new(bytes);
        read_preamble(&mut reader)?;

        let mut types = Vec::new();
        let mut imports = Vec::new();
        let mut func_type_indices = Vec::new();
        let mut tables = Vec::new();
        let mut memories = Vec::new();
        let mut globals = Vec::new();
        let mut exports = Vec::new();
        let mut start = None;
        let mut elements = Vec::new();
        let mut data = Vec::new();
        let mut code_entries = Vec::new();

        // Section ordering/uniqueness is not enforced (see `decode::read_section`
        // and SPEC_FULL.md §4.2): a section id seen more than once has its
        // payloads concatenated in encounter order rather than the later
        // occurrence silently discarding the earlier one.
        while !reader.is_empty() {
            match decode::read_section(&mut reader, config)? {
                SectionPayload::Custom => {}
                SectionPayload::Type(v) => types.extend(v),
                SectionPayload::Import(v) => imports.extend(v),
                SectionPayload::Function(v) => func_type_indices.extend(v),
                SectionPayload::Table(v) => tables.extend(v),
                SectionPayload::Memory(v) => memories.extend(v),
                SectionPayload::Global(v) => globals.extend(v),
                SectionPayload::Export(v) => exports.extend(v),
                SectionPayload::Start(v) => start = Some(v),
                SectionPayload::Element(v) => elements.extend(v),
                SectionPayload::Code(v) => code_entries.extend(v),
                SectionPayload::Data(v) => data.extend(v),
                SectionPayload::DataCount(_) => {
                    // Recorded by the original format to let a streaming
                    // decoder size the data segment vector up front; this
                    // decoder is not streaming, so the count itself is
                    // otherwise unused.
                }
            }
        }

        let import_func_count = imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Func(_)))
            .count();
        let total_func_count = import_func_count + func_type_indices.len();
        if total_func_count as u32 > config.max_functions {
            return Err(DecodeError::LengthMismatch {
                offset: 0,
                entity: "function count",
                expected: config.max_functions as usize,
                actual: total_func_count,
            }
            .into());
        }

        resolve_import_func_types(&mut imports, &types)?;
        let functions = merge_functions(func_type_indices, code_entries)?;

        Ok(Module {
            types,
            imports,
            functions,
            tables,
            memories,
            globals,
            exports,
            start,
            elements,
            data,
        })
    }
}

fn read_preamble(reader: &mut ByteReader) -> Result<()> {
    let offset = reader.offset();
    let mut magic = [0u8; 4];
    magic.copy_from_slice(reader.read_bytes(4)?);
    if magic != MAGIC {
        return Err(DecodeError::BadMagic { offset, expected: MAGIC, found: magic }.into());
    }

    let version_offset = reader.offset();
    let version_bytes = reader.read_bytes(4)?;
    let version = u32::from_le_bytes([
        version_bytes[0],
        version_bytes[1],
        version_bytes[2],
        version_bytes[3],
    ]);
    if version != SUPPORTED_VERSION {
        return Err(DecodeError::UnsupportedVersion { offset: version_offset, found: version }
            .into());
    }
    Ok(())
}

/// Resolve every import's type-section index into the `FuncType` it names.
/// The function section and the import section both reference the type
/// section by index; imports resolve it here so downstream consumers never
/// have to chase the indirection themselves.
fn resolve_import_func_types(imports: &mut [Import], types: &[FuncType]) -> Result<()> {
    for import in imports.iter_mut() {
        if let ImportDesc::Func(FuncTypeRef::Index(index)) = &import.desc {
            let index = *index;
            // Fix-up runs after every section has been decoded, since this
            // decoder doesn't enforce the type section preceding the import
            // section; the import's own byte offset isn't retained past
            // decode, so a dangling index is reported without one.
            let ty = types.get(index as usize).ok_or(DecodeError::DanglingTypeIndex {
                offset: 0,
                index,
                type_count: types.len(),
            })?;
            import.desc = ImportDesc::Func(FuncTypeRef::Resolved(ty.clone()));
        }
    }
    Ok(())
}

/// The function section declares each defined function's type index; the
/// code section declares its locals and body, in the same order. Merge the
/// two by position, since that's the only correspondence the format gives.
fn merge_functions(
    type_indices: Vec<u32>,
    code_entries: Vec<crate::decode::entities::CodeEntry>,
) -> Result<Vec<Function>> {
    if type_indices.len() != code_entries.len() {
        return Err(DecodeError::LengthMismatch {
            offset: 0,
            entity: "function/code section",
            expected: type_indices.len(),
            actual: code_entries.len(),
        }
        .into());
    }
    Ok(type_indices
        .into_iter()
        .zip(code_entries)
        .map(|(type_index, entry)| Function {
            type_index,
            locals: entry.locals,
            body: entry.body,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_module_bytes() -> Vec<u8> {
        vec![0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]
    }

    #[test]
    fn test_read_minimal_empty_module() {
        let module = Module::read(&empty_module_bytes()).unwrap();
        assert!(module.types.is_empty());
        assert!(module.functions.is_empty());
    }

    #[test]
    fn test_read_rejects_bad_magic() {
        let bytes = [0x00, 0x61, 0x73, 0x64, 0x01, 0x00, 0x00, 0x00];
        assert!(Module::read(&bytes).is_err());
    }

    #[test]
    fn test_read_rejects_unsupported_version() {
        let bytes = [0x00, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00];
        assert!(Module::read(&bytes).is_err());
    }

    #[test]
    fn test_read_one_empty_function() {
        let mut bytes = empty_module_bytes();
        // type section: 1 type, () -> ()
        bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        // function section: 1 function, type index 0
        bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        // code section: 1 entry, no locals, body: end
        bytes.extend_from_slice(&[0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b]);
        let module = Module::read(&bytes).unwrap();
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.functions[0].type_index, 0);
    }

    #[test]
    fn test_read_function_code_length_mismatch() {
        let mut bytes = empty_module_bytes();
        bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        // function section declares 1 function...
        bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        // ...but code section declares none.
        bytes.extend_from_slice(&[0x0a, 0x01, 0x00]);
        assert!(Module::read(&bytes).is_err());
    }

    #[test]
    fn test_read_import_func_type_fixup() {
        let mut bytes = empty_module_bytes();
        // type section: 1 type () -> ()
        bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        // import section: 1 import, module "m" name "f", func kind, type index 0
        bytes.extend_from_slice(&[0x02, 0x07, 0x01, 0x01, b'm', 0x01, b'f', 0x00, 0x00]);
        let module = Module::read(&bytes).unwrap();
        match &module.imports[0].desc {
            ImportDesc::Func(FuncTypeRef::Resolved(ft)) => {
                assert!(ft.params.is_empty());
            }
            other => panic!("expected resolved func type, got {:?}", other),
        }
    }

    #[test]
    fn test_read_import_dangling_type_index() {
        let mut bytes = empty_module_bytes();
        // import section only, referencing type index 0 with no type section
        bytes.extend_from_slice(&[0x02, 0x07, 0x01, 0x01, b'm', 0x01, b'f', 0x00, 0x00]);
        assert!(Module::read(&bytes).is_err());
    }

    #[test]
    fn test_read_unknown_section_id_is_fatal() {
        let mut bytes = empty_module_bytes();
        bytes.extend_from_slice(&[0x0d, 0x00]); // section id 13 doesn't exist
        assert!(Module::read(&bytes).is_err());
    }

    #[test]
    fn test_read_rejects_function_count_over_config_ceiling() {
        let mut bytes = empty_module_bytes();
        // type section: 1 type, () -> ()
        bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        // function section: 1 function, type index 0
        bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        // code section: 1 entry, no locals, body: end
        bytes.extend_from_slice(&[0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b]);
        let config = DecoderConfig {
            max_functions: 0,
            ..DecoderConfig::default()
        };
        assert!(Module::read_with_config(&bytes, &config).is_err());
    }

    #[test]
    fn test_read_identity_function() {
        let mut bytes = empty_module_bytes();
        // type section: 1 type, (i32) -> (i32); params=[i32], results=[i32]
        bytes.extend_from_slice(&[0x01, 0x06, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f]);
        // function section: 1 function, type index 0
        bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        // code section: 1 entry, no locals, body: local.get 0; end
        bytes.extend_from_slice(&[0x0a, 0x06, 0x01, 0x04, 0x00, 0x20, 0x00, 0x0b]);
        let module = Module::read(&bytes).unwrap();
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.functions[0].type_index, 0);
        assert_eq!(module.functions[0].body.len(), 2);
        assert_eq!(module.functions[0].body[0].continuation_pc, 1);
    }

    #[test]
    fn test_read_custom_section_sandwiched_between_real_sections() {
        let mut bytes = empty_module_bytes();
        // type section: 1 type, () -> ()
        bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        // custom section: name "x", no payload
        bytes.extend_from_slice(&[0x00, 0x02, 0x01, b'x']);
        // function + code: 1 empty function
        bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        bytes.extend_from_slice(&[0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b]);
        let module = Module::read(&bytes).unwrap();
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.functions.len(), 1);
    }

    #[test]
    fn test_read_duplicate_type_sections_are_concatenated() {
        let mut bytes = empty_module_bytes();
        // type section: 1 type, () -> ()
        bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        // a second type section: 1 type, (i32) -> (i32)
        bytes.extend_from_slice(&[0x01, 0x06, 0x01, 0x60, 0x01, 0x7f, 0x01, 0x7f]);
        let module = Module::read(&bytes).unwrap();
        assert_eq!(module.types.len(), 2);
        assert!(module.types[0].params.is_empty());
        assert_eq!(module.types[1].params, vec![crate::types::ValueType::I32]);
    }
}
