//! Binary serialization helpers.
//!
//! All consensus-facing types use explicit big-endian framing with
//! length-prefixed variable fields. Serde is reserved for config and
//! API types; bytes that hash or hit disk go through this module.

use thiserror::Error;

/// Codec errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// Ran out of bytes mid-field.
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    /// Input had bytes left over after a complete decode.
    #[error("{0} trailing bytes after decode")]
    TrailingBytes(usize),

    /// Unknown enum discriminant.
    #[error("invalid tag byte {0:#04x}")]
    InvalidTag(u8),

    /// A length prefix exceeded the sanity cap.
    #[error("declared length {len} exceeds cap {cap}")]
    LengthOverflow { len: usize, cap: usize },
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Cap on any single length-prefixed field, to bound allocation on
/// malformed input.
const MAX_FIELD_LEN: usize = 4 * 1024 * 1024;

/// Cursor over a byte slice with checked reads.
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    /// Wrap a slice for reading.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Fail unless the input was fully consumed.
    pub fn finish(self) -> CodecResult<()> {
        if self.remaining() != 0 {
            return Err(CodecError::TrailingBytes(self.remaining()));
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof(self.pos));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u16.
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// Read a big-endian u64.
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Read a big-endian i64.
    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Read a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        Ok(self.take(N)?.try_into().unwrap())
    }

    /// Read a u32-length-prefixed byte vector.
    pub fn read_var_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        if len > MAX_FIELD_LEN {
            return Err(CodecError::LengthOverflow {
                len,
                cap: MAX_FIELD_LEN,
            });
        }
        Ok(self.take(len)?.to_vec())
    }
}

/// Append a u32-length-prefixed byte slice.
pub(crate) fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}
