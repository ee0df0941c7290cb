use anyhow::Result;

use crate::error::DecodeError;

/// A cursor over a byte buffer offering the primitive reads a WebAssembly
/// binary decoder needs: single bytes, LEB128 integers, fixed-width
/// little-endian numbers, length-prefixed strings, and raw slices.
///
/// `base_offset` lets a windowed sub-reader (see [`ByteReader::sub_reader`])
/// still report errors in terms of the original buffer's absolute position,
/// rather than its own local window.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base_offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            base_offset: 0,
        }
    }

    /// Absolute offset of the next unread byte, in terms of the original
    /// top-level buffer.
    pub(crate) fn offset(&self) -> usize {
        self.base_offset + self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(DecodeError::UnexpectedEnd {
                offset: self.offset(),
                entity: "byte",
            })?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_bytes(&mut self, n: u32) -> Result<&'a [u8]> {
        let n = n as usize;
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.offset(),
                entity: "byte slice",
            }
            .into());
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consume exactly `n` bytes from `self` and return a reader bounded to
    /// that window, so a malformed inner decoder cannot over-read into
    /// whatever follows in the outer buffer.
    pub(crate) fn sub_reader(&mut self, n: u32) -> Result<ByteReader<'a>> {
        let offset = self.offset();
        let slice = self.read_bytes(n)?;
        Ok(ByteReader {
            buf: slice,
            pos: 0,
            base_offset: offset,
        })
    }

    pub(crate) fn read_u32_leb(&mut self) -> Result<u32> {
        Ok(self.read_uleb(32, "u32")? as u32)
    }

    pub(crate) fn read_u64_leb(&mut self) -> Result<u64> {
        self.read_uleb(64, "u64")
    }

    fn read_uleb(&mut self, bits: u32, entity: &'static str) -> Result<u64> {
        let start = self.offset();
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_byte()?;
            if shift >= bits {
                return Err(DecodeError::MalformedLeb {
                    offset: start,
                    entity,
                }
                .into());
            }
            let low_bits = (byte & 0x7f) as u64;
            result |= low_bits
                .checked_shl(shift)
                .ok_or(DecodeError::MalformedLeb {
                    offset: start,
                    entity,
                })?;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(result)
    }

    pub(crate) fn read_s32_leb(&mut self) -> Result<i32> {
        Ok(self.read_sleb(32, "i32")? as i32)
    }

    pub(crate) fn read_s33_leb(&mut self) -> Result<i64> {
        self.read_sleb(33, "s33")
    }

    pub(crate) fn read_s64_leb(&mut self) -> Result<i64> {
        self.read_sleb(64, "i64")
    }

    fn read_sleb(&mut self, bits: u32, entity: &'static str) -> Result<i64> {
        let start = self.offset();
        let mut result: i64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_byte()?;
            if shift >= bits {
                return Err(DecodeError::MalformedLeb {
                    offset: start,
                    entity,
                }
                .into());
            }
            result |= ((byte & 0x7f) as i64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                // Sign-extend if the sign bit of this final byte is set and
                // we haven't already filled the full width.
                if shift < bits && (byte & 0x40) != 0 {
                    result |= -1i64 << shift;
                }
                break;
            }
        }
        Ok(result)
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.read_bytes(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(f32::from_le_bytes(buf))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }

    pub(crate) fn read_name(&mut self) -> Result<String> {
        let offset = self.offset();
        let len = self.read_u32_leb()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::BadUtf8 { offset }.into())
    }

    /// Confirm every byte of a section (or sub-component declared with its
    /// own length, such as a code entry's body) was consumed. `declared_len`
    /// is the length this reader's window was created with.
    pub(crate) fn finish(self, entity: &'static str, declared_len: u32) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            let consumed = declared_len as usize - self.remaining();
            Err(DecodeError::LengthMismatch {
                offset: self.offset(),
                entity,
                expected: declared_len as usize,
                actual: consumed,
            }
            .into())
        }
    }
}
