//! Decoders for every section's entity records: types, imports, tables,
//! memories, globals, exports, element/data segments, and code entries.
//! Each `decode_*_section` function owns a `ByteReader` already windowed to
//! that section's declared length (see [`crate::decode::read_section`]).

use anyhow::Result;

use crate::decode::expr;
use crate::error::DecodeError;
use crate::flatten::flatten;
use crate::instr::FlatInstr;
use crate::reader::ByteReader;
use crate::types::{
    DataMode, DataSegment, ElementItems, ElementMode, ElementSegment, Export, ExportKind,
    FuncType, FuncTypeRef, Global, GlobalType, Import, ImportDesc, Limits, MemType, TableType,
    ValueType,
};

/// A code section entry, pre fix-up: locals already expanded and body
/// already flattened, but not yet paired with the function section's type
/// index. See [`crate::module::Module::read`].
#[derive(Clone, Debug)]
pub(crate) struct CodeEntry {
    pub(crate) locals: Vec<ValueType>,
    pub(crate) body: Vec<FlatInstr>,
}

fn decode_value_type(reader: &mut ByteReader) -> Result<ValueType> {
    let offset = reader.offset();
    let tag = reader.read_byte()?;
    Ok(ValueType::from_tag(tag, offset)?)
}

fn decode_const_expr(reader: &mut ByteReader) -> Result<Vec<FlatInstr>> {
    let tree = expr::decode_body(reader)?;
    Ok(flatten(&tree))
}

pub(crate) fn decode_limits(reader: &mut ByteReader) -> Result<Limits> {
    let offset = reader.offset();
    let tag = reader.read_byte()?;
    match tag {
        0x00 => Ok(Limits {
            min: reader.read_u32_leb()?,
            max: None,
        }),
        0x01 => {
            let min = reader.read_u32_leb()?;
            let max = reader.read_u32_leb()?;
            if max < min {
                return Err(DecodeError::MalformedLimits { offset, tag }.into());
            }
            Ok(Limits { min, max: Some(max) })
        }
        _ => Err(DecodeError::MalformedLimits { offset, tag }.into()),
    }
}

pub(crate) fn decode_table_type(reader: &mut ByteReader) -> Result<TableType> {
    let offset = reader.offset();
    let elem_type = decode_value_type(reader)?;
    if !matches!(elem_type, ValueType::Funcref | ValueType::Externref) {
        return Err(DecodeError::MalformedFuncType {
            offset,
            found: elem_type.to_tag(),
        }
        .into());
    }
    let limits = decode_limits(reader)?;
    Ok(TableType { elem_type, limits })
}

pub(crate) fn decode_mem_type(reader: &mut ByteReader) -> Result<MemType> {
    Ok(MemType {
        limits: decode_limits(reader)?,
    })
}

pub(crate) fn decode_global_type(reader: &mut ByteReader) -> Result<GlobalType> {
    let offset = reader.offset();
    let value_type = decode_value_type(reader)?;
    let tag = reader.read_byte()?;
    let mutable = match tag {
        0x00 => false,
        0x01 => true,
        _ => {
            return Err(DecodeError::UnknownSubEncoding {
                offset,
                entity: "global mutability",
                tag: tag as u32,
            }
            .into())
        }
    };
    Ok(GlobalType { value_type, mutable })
}

fn decode_func_type(reader: &mut ByteReader) -> Result<FuncType> {
    let offset = reader.offset();
    let tag = reader.read_byte()?;
    if tag != 0x60 {
        return Err(DecodeError::MalformedFuncType { offset, found: tag }.into());
    }
    let param_count = reader.read_u32_leb()?;
    let mut params = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        params.push(decode_value_type(reader)?);
    }
    let result_count = reader.read_u32_leb()?;
    let mut results = Vec::with_capacity(result_count as usize);
    for _ in 0..result_count {
        results.push(decode_value_type(reader)?);
    }
    Ok(FuncType { params, results })
}

fn decode_import(reader: &mut ByteReader) -> Result<Import> {
    let offset = reader.offset();
    let module = reader.read_name()?;
    let name = reader.read_name()?;
    let kind = reader.read_byte()?;
    let desc = match kind {
        0x00 => ImportDesc::Func(FuncTypeRef::Index(reader.read_u32_leb()?)),
        0x01 => ImportDesc::Table(decode_table_type(reader)?),
        0x02 => ImportDesc::Mem(decode_mem_type(reader)?),
        0x03 => ImportDesc::Global(decode_global_type(reader)?),
        _ => {
            return Err(DecodeError::UnknownSubEncoding {
                offset,
                entity: "import kind",
                tag: kind as u32,
            }
            .into())
        }
    };
    Ok(Import { module, name, desc })
}

fn decode_export(reader: &mut ByteReader) -> Result<Export> {
    let offset = reader.offset();
    let name = reader.read_name()?;
    let tag = reader.read_byte()?;
    let kind = ExportKind::from_tag(tag, offset)?;
    let index = reader.read_u32_leb()?;
    Ok(Export { name, kind, index })
}

fn decode_global(reader: &mut ByteReader) -> Result<Global> {
    let ty = decode_global_type(reader)?;
    let init = decode_const_expr(reader)?;
    Ok(Global { ty, init })
}

/// Element segments have eight binary sub-encodings distinguished by a
/// leading `u32` flags value, mixing three independent axes: active vs.
/// passive vs. declarative, whether a non-zero table index is present, and
/// whether items are function indices or full constant expressions.
fn decode_element_segment(reader: &mut ByteReader) -> Result<ElementSegment> {
    let offset = reader.offset();
    let flags = reader.read_u32_leb()?;
    let segment = match flags {
        0 => {
            let offset_expr = decode_const_expr(reader)?;
            let items = decode_func_index_vec(reader)?;
            ElementSegment {
                elem_type: ValueType::Funcref,
                mode: ElementMode::Active { table_index: 0, offset: offset_expr },
                items: ElementItems::FuncIndices(items),
            }
        }
        1 => {
            reader.read_byte()?; // elemkind, always 0x00 (funcref)
            let items = decode_func_index_vec(reader)?;
            ElementSegment {
                elem_type: ValueType::Funcref,
                mode: ElementMode::Passive,
                items: ElementItems::FuncIndices(items),
            }
        }
        2 => {
            let table_index = reader.read_u32_leb()?;
            let offset_expr = decode_const_expr(reader)?;
            reader.read_byte()?; // elemkind
            let items = decode_func_index_vec(reader)?;
            ElementSegment {
                elem_type: ValueType::Funcref,
                mode: ElementMode::Active { table_index, offset: offset_expr },
                items: ElementItems::FuncIndices(items),
            }
        }
        3 => {
            reader.read_byte()?; // elemkind
            let items = decode_func_index_vec(reader)?;
            ElementSegment {
                elem_type: ValueType::Funcref,
                mode: ElementMode::Declarative,
                items: ElementItems::FuncIndices(items),
            }
        }
        4 => {
            let offset_expr = decode_const_expr(reader)?;
            let items = decode_elem_expr_vec(reader)?;
            ElementSegment {
                elem_type: ValueType::Funcref,
                mode: ElementMode::Active { table_index: 0, offset: offset_expr },
                items: ElementItems::Exprs(items),
            }
        }
        5 => {
            let elem_type = decode_value_type(reader)?;
            let items = decode_elem_expr_vec(reader)?;
            ElementSegment {
                elem_type,
                mode: ElementMode::Passive,
                items: ElementItems::Exprs(items),
            }
        }
        6 => {
            let table_index = reader.read_u32_leb()?;
            let offset_expr = decode_const_expr(reader)?;
            let elem_type = decode_value_type(reader)?;
            let items = decode_elem_expr_vec(reader)?;
            ElementSegment {
                elem_type,
                mode: ElementMode::Active { table_index, offset: offset_expr },
                items: ElementItems::Exprs(items),
            }
        }
        7 => {
            let elem_type = decode_value_type(reader)?;
            let items = decode_elem_expr_vec(reader)?;
            ElementSegment {
                elem_type,
                mode: ElementMode::Declarative,
                items: ElementItems::Exprs(items),
            }
        }
        other => return Err(DecodeError::MalformedElemSegment { offset, tag: other }.into()),
    };
    Ok(segment)
}

fn decode_func_index_vec(reader: &mut ByteReader) -> Result<Vec<u32>> {
    let count = reader.read_u32_leb()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(reader.read_u32_leb()?);
    }
    Ok(out)
}

fn decode_elem_expr_vec(reader: &mut ByteReader) -> Result<Vec<Vec<FlatInstr>>> {
    let count = reader.read_u32_leb()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(decode_const_expr(reader)?);
    }
    Ok(out)
}

/// Data segments have three sub-encodings, mirroring the active/passive
/// split of element segments but without the function-index/expr-item
/// distinction (a data segment's payload is always raw bytes).
fn decode_data_segment(reader: &mut ByteReader) -> Result<DataSegment> {
    let offset = reader.offset();
    let flags = reader.read_u32_leb()?;
    let segment = match flags {
        0 => {
            let offset_expr = decode_const_expr(reader)?;
            let bytes = decode_byte_vec(reader)?;
            DataSegment {
                mode: DataMode::Active { mem_index: 0, offset: offset_expr },
                bytes,
            }
        }
        1 => DataSegment {
            mode: DataMode::Passive,
            bytes: decode_byte_vec(reader)?,
        },
        2 => {
            let mem_index = reader.read_u32_leb()?;
            let offset_expr = decode_const_expr(reader)?;
            let bytes = decode_byte_vec(reader)?;
            DataSegment {
                mode: DataMode::Active { mem_index, offset: offset_expr },
                bytes,
            }
        }
        other => return Err(DecodeError::MalformedDataSegment { offset, tag: other }.into()),
    };
    Ok(segment)
}

fn decode_byte_vec(reader: &mut ByteReader) -> Result<Vec<u8>> {
    let len = reader.read_u32_leb()?;
    Ok(reader.read_bytes(len)?.to_vec())
}

fn decode_code_entry(reader: &mut ByteReader) -> Result<CodeEntry> {
    let body_size = reader.read_u32_leb()?;
    let mut body_reader = reader.sub_reader(body_size)?;

    let local_run_count = body_reader.read_u32_leb()?;
    let mut locals = Vec::new();
    for _ in 0..local_run_count {
        let run = body_reader.read_u32_leb()?;
        let vt = decode_value_type(&mut body_reader)?;
        locals.resize(locals.len() + run as usize, vt);
    }

    let tree = expr::decode_body(&mut body_reader)?;
    let body = flatten(&tree);
    body_reader.finish("code entry body", body_size)?;

    Ok(CodeEntry { locals, body })
}

macro_rules! decode_vec_section {
    ($fn_name:ident, $item:ty, $item_decoder:expr) => {
        pub(crate) fn $fn_name(reader: &mut ByteReader) -> Result<Vec<$item>> {
            let count = reader.read_u32_leb()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push($item_decoder(reader)?);
            }
            Ok(items)
        }
    };
}

decode_vec_section!(decode_type_section, FuncType, decode_func_type);
decode_vec_section!(decode_import_section, Import, decode_import);
decode_vec_section!(decode_function_section, u32, ByteReader::read_u32_leb);
decode_vec_section!(decode_table_section, TableType, decode_table_type);
decode_vec_section!(decode_memory_section, MemType, decode_mem_type);
decode_vec_section!(decode_global_section, Global, decode_global);
decode_vec_section!(decode_export_section, Export, decode_export);
decode_vec_section!(decode_element_section, ElementSegment, decode_element_segment);
decode_vec_section!(decode_code_section, CodeEntry, decode_code_entry);
decode_vec_section!(decode_data_section, DataSegment, decode_data_segment);

pub(crate) fn decode_start_section(reader: &mut ByteReader) -> Result<u32> {
    reader.read_u32_leb()
}

pub(crate) fn decode_datacount_section(reader: &mut ByteReader) -> Result<u32> {
    reader.read_u32_leb()
}
