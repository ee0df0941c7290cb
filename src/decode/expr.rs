//! Decodes a byte stream of instructions into the decode-time [`Instr`]
//! tree. Used for function bodies and every constant expression (global
//! initializers, element/data segment offsets).
//!
//! Mirrors the shape of a transcoder that walks opcodes and dispatches on
//! operand count/kind, except the destination is an owned tree rather than
//! a flat byte buffer — control instructions recurse back into this module
//! instead of emitting bytes directly.

use anyhow::Result;

use crate::error::DecodeError;
use crate::instr::{BlockSignature, BulkOpcode, Instr, InstrChildren, InstrKind, MemArg, Opcode};
use crate::reader::ByteReader;
use crate::types::ValueType;

/// Decode a full instruction sequence terminated by its matching `end` —
/// used for function bodies and constant expressions, neither of which can
/// contain a bare `else`.
pub(crate) fn decode_body(reader: &mut ByteReader) -> Result<Vec<Instr>> {
    let (body, ended_with_else) = decode_instr_list(reader, false)?;
    debug_assert!(!ended_with_else);
    Ok(body)
}

/// Decode one instruction sequence, stopping at the first `end` always, or
/// at the first `else` too when `allow_else` is set (i.e. we're decoding
/// the then-arm of an `if`). Returns the sequence including its terminator,
/// and whether that terminator was `else` rather than `end`.
fn decode_instr_list(reader: &mut ByteReader, allow_else: bool) -> Result<(Vec<Instr>, bool)> {
    let mut list = Vec::new();
    loop {
        let offset = reader.offset();
        let instr = decode_instr(reader)?;
        let is_end = matches!(instr.kind, InstrKind::End);
        let is_else = matches!(instr.kind, InstrKind::Else);
        if is_else && !allow_else {
            return Err(DecodeError::UnknownOpcode {
                offset,
                opcode: Opcode::Else as u8,
            }
            .into());
        }
        list.push(instr);
        if is_end {
            return Ok((list, false));
        }
        if is_else {
            return Ok((list, true));
        }
    }
}

fn decode_instr(reader: &mut ByteReader) -> Result<Instr> {
    let offset = reader.offset();
    let byte = reader.read_byte()?;
    match byte {
        0xfc => decode_bulk_instr(reader, offset),
        0xfd => Err(DecodeError::UnknownOpcode { offset, opcode: byte }.into()),
        _ => {
            let opcode = Opcode::try_from(byte)
                .map_err(|_| DecodeError::UnknownOpcode { offset, opcode: byte })?;
            decode_plain_instr(reader, opcode, offset)
        }
    }
}

fn decode_plain_instr(reader: &mut ByteReader, opcode: Opcode, offset: usize) -> Result<Instr> {
    use Opcode::*;

    let instr = match opcode {
        Unreachable => Instr::leaf(InstrKind::Unreachable),
        Nop => Instr::leaf(InstrKind::Nop),

        Block => {
            let sig = decode_block_signature(reader, offset)?;
            let (body, _) = decode_instr_list(reader, false)?;
            Instr {
                kind: InstrKind::Block(sig),
                children: InstrChildren::Block(body),
            }
        }
        Loop => {
            let sig = decode_block_signature(reader, offset)?;
            let (body, _) = decode_instr_list(reader, false)?;
            Instr {
                kind: InstrKind::Loop(sig),
                children: InstrChildren::Block(body),
            }
        }
        If => {
            let sig = decode_block_signature(reader, offset)?;
            let (then_body, ended_with_else) = decode_instr_list(reader, true)?;
            let else_body = if ended_with_else {
                Some(decode_instr_list(reader, false)?.0)
            } else {
                None
            };
            Instr {
                kind: InstrKind::If(sig),
                children: InstrChildren::If { then_body, else_body },
            }
        }
        Else => Instr::leaf(InstrKind::Else),
        End => Instr::leaf(InstrKind::End),

        Br => Instr::leaf(InstrKind::Br(reader.read_u32_leb()?)),
        BrIf => Instr::leaf(InstrKind::BrIf(reader.read_u32_leb()?)),
        BrTable => {
            let count = reader.read_u32_leb()?;
            let mut targets = Vec::with_capacity(count as usize);
            for _ in 0..count {
                targets.push(reader.read_u32_leb()?);
            }
            let default = reader.read_u32_leb()?;
            Instr::leaf(InstrKind::BrTable { targets, default })
        }
        Return => Instr::leaf(InstrKind::Return),
        Call => Instr::leaf(InstrKind::Call(reader.read_u32_leb()?)),
        CallIndirect => {
            let type_index = reader.read_u32_leb()?;
            let table_index = reader.read_u32_leb()?;
            Instr::leaf(InstrKind::CallIndirect { type_index, table_index })
        }

        RefNull => {
            let tag = reader.read_byte()?;
            let vt = ValueType::from_tag(tag, offset)?;
            Instr::leaf(InstrKind::RefNull(vt))
        }
        RefIsNull => Instr::leaf(InstrKind::RefIsNull),
        RefFunc => Instr::leaf(InstrKind::RefFunc(reader.read_u32_leb()?)),

        Drop => Instr::leaf(InstrKind::Drop),
        Select => Instr::leaf(InstrKind::Select),
        SelectT => {
            let count = reader.read_u32_leb()?;
            let mut types = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let tag = reader.read_byte()?;
                types.push(ValueType::from_tag(tag, reader.offset())?);
            }
            Instr::leaf(InstrKind::SelectT(types))
        }

        LocalGet => Instr::leaf(InstrKind::LocalGet(reader.read_u32_leb()?)),
        LocalSet => Instr::leaf(InstrKind::LocalSet(reader.read_u32_leb()?)),
        LocalTee => Instr::leaf(InstrKind::LocalTee(reader.read_u32_leb()?)),
        GlobalGet => Instr::leaf(InstrKind::GlobalGet(reader.read_u32_leb()?)),
        GlobalSet => Instr::leaf(InstrKind::GlobalSet(reader.read_u32_leb()?)),

        TableGet => Instr::leaf(InstrKind::TableGet(reader.read_u32_leb()?)),
        TableSet => Instr::leaf(InstrKind::TableSet(reader.read_u32_leb()?)),

        I32Load | I64Load | F32Load | F64Load | I32Load8S | I32Load8U | I32Load16S
        | I32Load16U | I64Load8S | I64Load8U | I64Load16S | I64Load16U | I64Load32S
        | I64Load32U => Instr::leaf(InstrKind::Load {
            opcode,
            memarg: decode_memarg(reader)?,
        }),
        I32Store | I64Store | F32Store | F64Store | I32Store8 | I32Store16 | I64Store8
        | I64Store16 | I64Store32 => Instr::leaf(InstrKind::Store {
            opcode,
            memarg: decode_memarg(reader)?,
        }),
        MemorySize => {
            reader.read_byte()?; // reserved
            Instr::leaf(InstrKind::MemorySize)
        }
        MemoryGrow => {
            reader.read_byte()?; // reserved
            Instr::leaf(InstrKind::MemoryGrow)
        }

        I32Const => Instr::leaf(InstrKind::I32Const(reader.read_s32_leb()?)),
        I64Const => Instr::leaf(InstrKind::I64Const(reader.read_s64_leb()?)),
        F32Const => Instr::leaf(InstrKind::F32Const(reader.read_f32()?)),
        F64Const => Instr::leaf(InstrKind::F64Const(reader.read_f64()?)),

        BulkPrefix | VectorPrefix => unreachable!("handled in decode_instr"),

        // Every remaining opcode (comparisons, arithmetic, conversions) has
        // no immediates and no control-flow effect.
        other => Instr::leaf(InstrKind::Numeric(other)),
    };
    Ok(instr)
}

fn decode_bulk_instr(reader: &mut ByteReader, offset: usize) -> Result<Instr> {
    let sub = reader.read_u32_leb()?;
    let op = BulkOpcode::try_from(sub).map_err(|_| DecodeError::UnknownSubEncoding {
        offset,
        entity: "bulk opcode",
        tag: sub,
    })?;
    use BulkOpcode::*;
    let kind = match op {
        I32TruncSatF32S | I32TruncSatF32U | I32TruncSatF64S | I32TruncSatF64U
        | I64TruncSatF32S | I64TruncSatF32U | I64TruncSatF64S | I64TruncSatF64U => {
            InstrKind::SaturatingTrunc(op)
        }
        MemoryInit => {
            let data_index = reader.read_u32_leb()?;
            reader.read_byte()?; // reserved memory index
            InstrKind::MemoryInit(data_index)
        }
        DataDrop => InstrKind::DataDrop(reader.read_u32_leb()?),
        MemoryCopy => {
            reader.read_byte()?; // reserved dst memory index
            reader.read_byte()?; // reserved src memory index
            InstrKind::MemoryCopy
        }
        MemoryFill => {
            reader.read_byte()?; // reserved
            InstrKind::MemoryFill
        }
        TableInit => {
            let elem_index = reader.read_u32_leb()?;
            let table_index = reader.read_u32_leb()?;
            InstrKind::TableInit { table_index, elem_index }
        }
        ElemDrop => InstrKind::ElemDrop(reader.read_u32_leb()?),
        TableCopy => {
            let dst_table = reader.read_u32_leb()?;
            let src_table = reader.read_u32_leb()?;
            InstrKind::TableCopy { dst_table, src_table }
        }
        TableGrow => InstrKind::TableGrow(reader.read_u32_leb()?),
        TableSize => InstrKind::TableSize(reader.read_u32_leb()?),
        TableFill => InstrKind::TableFill(reader.read_u32_leb()?),
    };
    Ok(Instr::leaf(kind))
}

fn decode_memarg(reader: &mut ByteReader) -> Result<MemArg> {
    let align = reader.read_u32_leb()?;
    let offset = reader.read_u32_leb()?;
    Ok(MemArg { align, offset })
}

/// Decode a `blocktype`: a signed 33-bit LEB128 value that is either the
/// empty-type marker, a compact single value type, or (if non-negative) a
/// type section index.
fn decode_block_signature(reader: &mut ByteReader, offset: usize) -> Result<BlockSignature> {
    let value = reader.read_s33_leb()?;
    let sig = match value {
        -64 => BlockSignature::Empty,
        -1 => BlockSignature::Value(ValueType::I32),
        -2 => BlockSignature::Value(ValueType::I64),
        -3 => BlockSignature::Value(ValueType::F32),
        -4 => BlockSignature::Value(ValueType::F64),
        -5 => BlockSignature::Value(ValueType::V128),
        -16 => BlockSignature::Value(ValueType::Funcref),
        -17 => BlockSignature::Value(ValueType::Externref),
        v if v >= 0 => BlockSignature::TypeIndex(v as u32),
        v => {
            return Err(DecodeError::UnknownSubEncoding {
                offset,
                entity: "block type",
                tag: v as u32,
            }
            .into())
        }
    };
    Ok(sig)
}
