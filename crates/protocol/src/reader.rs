//! Bounds-checked big-endian payload reader.

use crate::error::DecodeError;

/// Cursor over a single message payload.
///
/// Every read is bounds-checked and returns [`DecodeError::Truncated`] instead
/// of reading past the end of the buffer.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Check the total payload length against the allowed range for a message.
    pub fn validate(&self, name: &'static str, min: usize, max: usize) -> Result<&Self, DecodeError> {
        let len = self.buf.len();
        if len < min || len > max {
            return Err(DecodeError::InvalidLength { name, len, min, max });
        }
        Ok(self)
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(i8::from_be_bytes(self.read_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Consume everything left in the payload.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }

    /// Read `n` bytes as UTF-8 text. Invalid sequences are replaced.
    pub fn read_str(&mut self, n: usize) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.read_bytes(n)?).into_owned())
    }

    pub fn read_remaining_str(&mut self) -> String {
        String::from_utf8_lossy(self.read_remaining()).into_owned()
    }

    /// Read the rest of the payload as a list of big-endian u16 values.
    pub fn read_remaining_u16s(&mut self) -> Result<Vec<u16>, DecodeError> {
        if self.remaining() % 2 != 0 {
            return Err(DecodeError::InvalidField("u16 list has odd length"));
        }
        Ok(self
            .read_remaining()
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect())
    }
}
