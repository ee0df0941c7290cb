use thiserror::Error;

/// Every way decoding a WebAssembly module can fail.
///
/// Every variant carries the absolute byte offset at which the failure was
/// detected so a caller can locate the bad byte without re-scanning the
/// input.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset} while decoding {entity}")]
    UnexpectedEnd {
        offset: usize,
        entity: &'static str,
    },

    #[error("not a WebAssembly binary: expected magic {expected:02x?}, found {found:02x?} at offset {offset}")]
    BadMagic {
        offset: usize,
        expected: [u8; 4],
        found: [u8; 4],
    },

    #[error("unsupported WebAssembly version {found} at offset {offset}")]
    UnsupportedVersion { offset: usize, found: u32 },

    #[error("unknown section id {id} at offset {offset}")]
    UnknownSection { offset: usize, id: u8 },

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },

    #[error("unknown {entity} sub-encoding {tag} at offset {offset}")]
    UnknownSubEncoding {
        offset: usize,
        entity: &'static str,
        tag: u32,
    },

    #[error("malformed LEB128 integer while decoding {entity} at offset {offset}")]
    MalformedLeb {
        offset: usize,
        entity: &'static str,
    },

    #[error("invalid UTF-8 in name at offset {offset}")]
    BadUtf8 { offset: usize },

    #[error("malformed limits: invalid tag byte {tag:#04x} at offset {offset}")]
    MalformedLimits { offset: usize, tag: u8 },

    #[error("malformed function type: expected magic 0x60, found {found:#04x} at offset {offset}")]
    MalformedFuncType { offset: usize, found: u8 },

    #[error("malformed element segment: invalid tag {tag} at offset {offset}")]
    MalformedElemSegment { offset: usize, tag: u32 },

    #[error("malformed data segment: invalid tag {tag} at offset {offset}")]
    MalformedDataSegment { offset: usize, tag: u32 },

    #[error("{entity} length mismatch at offset {offset}: expected {expected}, found {actual}")]
    LengthMismatch {
        offset: usize,
        entity: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("import at offset {offset} references type index {index}, but only {type_count} types are defined")]
    DanglingTypeIndex {
        offset: usize,
        index: u32,
        type_count: usize,
    },
}
