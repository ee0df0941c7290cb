//! The section dispatcher: reads `(id, length)` pairs off the top-level
//! byte stream and routes each section's windowed sub-reader to its entity
//! decoder. [`crate::module::Module::read`] drives the outer loop; this
//! module supplies the per-section payload shape and the decode call for
//! each one.

pub(crate) mod entities;
pub(crate) mod expr;

use anyhow::Result;
use num_enum::TryFromPrimitive;

use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::reader::ByteReader;
use crate::types::{DataSegment, Export, FuncType, Global, Import, MemType, TableType};
use entities::CodeEntry;

/// The section id byte, per the WebAssembly core binary format.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
pub(crate) enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
}

/// Everything a single section can contribute to a [`crate::module::Module`]
/// under construction, pre fix-up.
pub(crate) enum SectionPayload {
    Custom,
    Type(Vec<FuncType>),
    Import(Vec<Import>),
    Function(Vec<u32>),
    Table(Vec<TableType>),
    Memory(Vec<MemType>),
    Global(Vec<Global>),
    Export(Vec<Export>),
    Start(u32),
    Element(Vec<crate::types::ElementSegment>),
    Code(Vec<CodeEntry>),
    Data(Vec<DataSegment>),
    DataCount(u32),
}

/// Read one section's `(id, length)` header and decode its payload, having
/// first bounded the reader to exactly `length` bytes so a malformed entity
/// decoder cannot read past this section's end.
///
/// Custom sections are logged and otherwise ignored: this crate surfaces no
/// custom-section content, matching its decode-only (no validation, no
/// execution) scope.
pub(crate) fn read_section(
    reader: &mut ByteReader,
    config: &DecoderConfig,
) -> Result<SectionPayload> {
    let header_offset = reader.offset();
    let id_byte = reader.read_byte()?;
    let length = reader.read_u32_leb()?;
    if length > config.max_section_size {
        return Err(DecodeError::LengthMismatch {
            offset: header_offset,
            entity: "section",
            expected: config.max_section_size as usize,
            actual: length as usize,
        }
        .into());
    }

    let id = SectionId::try_from(id_byte).map_err(|_| DecodeError::UnknownSection {
        offset: header_offset,
        id: id_byte,
    })?;
    let mut sub = reader.sub_reader(length)?;

    let payload = match id {
        SectionId::Custom => {
            let name = sub.read_name()?;
            log::trace!("skipping custom section {:?}", name);
            // Custom section payload is opaque and not surfaced; don't
            // require it to be fully consumed.
            return Ok(SectionPayload::Custom);
        }
        SectionId::Type => SectionPayload::Type(entities::decode_type_section(&mut sub)?),
        SectionId::Import => SectionPayload::Import(entities::decode_import_section(&mut sub)?),
        SectionId::Function => {
            SectionPayload::Function(entities::decode_function_section(&mut sub)?)
        }
        SectionId::Table => SectionPayload::Table(entities::decode_table_section(&mut sub)?),
        SectionId::Memory => SectionPayload::Memory(entities::decode_memory_section(&mut sub)?),
        SectionId::Global => SectionPayload::Global(entities::decode_global_section(&mut sub)?),
        SectionId::Export => SectionPayload::Export(entities::decode_export_section(&mut sub)?),
        SectionId::Start => SectionPayload::Start(entities::decode_start_section(&mut sub)?),
        SectionId::Element => {
            SectionPayload::Element(entities::decode_element_section(&mut sub)?)
        }
        SectionId::Code => SectionPayload::Code(entities::decode_code_section(&mut sub)?),
        SectionId::Data => SectionPayload::Data(entities::decode_data_section(&mut sub)?),
        SectionId::DataCount => {
            SectionPayload::DataCount(entities::decode_datacount_section(&mut sub)?)
        }
    };

    sub.finish(section_name(id), length)?;
    log::debug!("decoded {} section ({} bytes)", section_name(id), length);
    Ok(payload)
}

fn section_name(id: SectionId) -> &'static str {
    match id {
        SectionId::Custom => "custom",
        SectionId::Type => "type",
        SectionId::Import => "import",
        SectionId::Function => "function",
        SectionId::Table => "table",
        SectionId::Memory => "memory",
        SectionId::Global => "global",
        SectionId::Export => "export",
        SectionId::Start => "start",
        SectionId::Element => "element",
        SectionId::Code => "code",
        SectionId::Data => "data",
        SectionId::DataCount => "datacount",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_section_unknown_id() {
        let mut reader = ByteReader::new(&[0xff, 0x00]);
        let config = DecoderConfig::default();
        assert!(read_section(&mut reader, &config).is_err());
    }

    #[test]
    fn test_read_section_custom_is_skipped() {
        let _ = env_logger::try_init();
        // id=0 (custom), length=6: name len 4 "name" payload consumed only
        // for the name; remainder ignored.
        let mut bytes = vec![0x00, 0x05, 0x04];
        bytes.extend_from_slice(b"name");
        let mut reader = ByteReader::new(&bytes);
        let config = DecoderConfig::default();
        let payload = read_section(&mut reader, &config).unwrap();
        assert!(matches!(payload, SectionPayload::Custom));
    }

    #[test]
    fn test_read_section_type() {
        // id=1 (type), length=6: 1 func type () -> ()
        let bytes = [0x01, 0x04, 0x01, 0x60, 0x00, 0x00];
        let mut reader = ByteReader::new(&bytes);
        let config = DecoderConfig::default();
        let payload = read_section(&mut reader, &config).unwrap();
        match payload {
            SectionPayload::Type(types) => assert_eq!(types.len(), 1),
            _ => panic!("expected type section"),
        }
    }

    #[test]
    fn test_read_section_length_mismatch() {
        // declares length 4 but type section decoder only consumes 3 bytes
        let bytes = [0x01, 0x04, 0x01, 0x60, 0x00, 0x00, 0x00];
        let mut reader = ByteReader::new(&bytes);
        // Truncate the declared length so one byte is left unconsumed.
        let bytes2 = [0x01, 0x05, 0x01, 0x60, 0x00, 0x00, 0x00];
        let mut reader2 = ByteReader::new(&bytes2);
        let config = DecoderConfig::default();
        assert!(read_section(&mut reader, &config).is_ok());
        assert!(read_section(&mut reader2, &config).is_err());
    }
}
