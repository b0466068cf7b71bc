//! Primitive wire encodings: LEB128 varints, sign-magnitude varints,
//! length-prefixed strings and fixed-width fields.
//!
//! Varints carry 7 data bits per byte with the high bit as continuation and
//! are capped at [`MAX_LEB128_BYTES`] bytes. Signed varints are
//! `(magnitude << 1) | sign`, not zigzag.

use crate::error::{BytecodeError, Result};
use crate::options::CodecOptions;
use crate::value::JsString;

/// Maximum bytes in a varint (5 groups of 7 bits cover 32 bits)
pub const MAX_LEB128_BYTES: usize = 5;

/// Longest string byte count representable next to the wide-char bit
pub const MAX_STRING_LEN: usize = (u32::MAX >> 1) as usize;

/// Forward-only cursor over an in-memory stream
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    options: CodecOptions,
}

impl<'a> Reader<'a> {
    /// Create a reader with default options
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_options(buf, CodecOptions::default())
    }

    /// Create a reader with the given options
    pub fn with_options(buf: &'a [u8], options: CodecOptions) -> Self {
        Self {
            buf,
            pos: 0,
            options,
        }
    }

    /// Options this reader was created with
    #[inline]
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Offset of the next unread byte
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Check if every byte has been read
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read `len` raw bytes. Fails before consuming anything if fewer remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(BytecodeError::UnexpectedEnd {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let [byte] = self.read_array::<1>()?;
        Ok(byte)
    }

    /// Read a fixed-width u16 in host order (swapped if configured)
    pub fn read_u16(&mut self) -> Result<u16> {
        let value = u16::from_ne_bytes(self.read_array()?);
        Ok(if self.options.byte_swap {
            value.swap_bytes()
        } else {
            value
        })
    }

    /// Read an IEEE754 binary64 in host order (swapped if configured)
    pub fn read_f64(&mut self) -> Result<f64> {
        let bits = u64::from_ne_bytes(self.read_array()?);
        let bits = if self.options.byte_swap {
            bits.swap_bytes()
        } else {
            bits
        };
        Ok(f64::from_bits(bits))
    }

    /// Read up to 35 bits of varint payload
    fn read_varint(&mut self) -> Result<(u64, usize)> {
        let start = self.pos;
        let mut result = 0u64;
        for i in 0..MAX_LEB128_BYTES {
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                if self.options.strict && byte == 0 && i > 0 {
                    return Err(BytecodeError::NonCanonicalVarint { offset: start });
                }
                return Ok((result, start));
            }
        }
        Err(BytecodeError::UnterminatedVarint { offset: start })
    }

    /// Read an unsigned LEB128 value
    pub fn read_leb128(&mut self) -> Result<u32> {
        let (value, offset) = self.read_varint()?;
        if value > u64::from(u32::MAX) && self.options.strict {
            return Err(BytecodeError::VarintOverflow { offset });
        }
        Ok(value as u32)
    }

    /// Read a sign-magnitude varint
    pub fn read_sleb128(&mut self) -> Result<i32> {
        let (raw, offset) = self.read_varint()?;
        let negative = raw & 1 == 1;
        let magnitude = raw >> 1;

        let limit = if negative {
            1u64 << 31
        } else {
            i32::MAX as u64
        };
        if magnitude > limit && self.options.strict {
            return Err(BytecodeError::VarintOverflow { offset });
        }
        if negative && magnitude == 0 && self.options.strict {
            return Err(BytecodeError::NegativeZero { offset });
        }

        let magnitude = magnitude as u32 as i32;
        Ok(if negative {
            magnitude.wrapping_neg()
        } else {
            magnitude
        })
    }

    /// Read a length-and-type prefixed string. The wide-char bit is kept as
    /// data; the payload is always `length >> 1` raw bytes.
    pub fn read_js_string(&mut self) -> Result<JsString> {
        let length_and_type = self.read_leb128()?;
        let wide = length_and_type & 1 == 1;
        let bytes = self.read_bytes((length_and_type >> 1) as usize)?;
        Ok(JsString::from_raw(wide, bytes.to_vec()))
    }
}

/// Growable output sink
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
    byte_swap: bool,
}

impl Writer {
    /// Create an empty writer in host byte order
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer honoring `options.byte_swap`
    pub fn with_options(options: &CodecOptions) -> Self {
        Self {
            buf: Vec::new(),
            byte_swap: options.byte_swap,
        }
    }

    /// Bytes written so far
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View the written bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Take the written bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write one byte
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a fixed-width u16 in host order (swapped if configured)
    pub fn write_u16(&mut self, value: u16) {
        let value = if self.byte_swap {
            value.swap_bytes()
        } else {
            value
        };
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    /// Write an IEEE754 binary64 in host order (swapped if configured)
    pub fn write_f64(&mut self, value: f64) {
        let bits = if self.byte_swap {
            value.to_bits().swap_bytes()
        } else {
            value.to_bits()
        };
        self.buf.extend_from_slice(&bits.to_ne_bytes());
    }

    fn write_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// Write an unsigned LEB128 value
    pub fn write_leb128(&mut self, value: u32) {
        self.write_varint(u64::from(value));
    }

    /// Write a sign-magnitude varint. `i32::MIN` needs a 33-bit wire value.
    pub fn write_sleb128(&mut self, value: i32) {
        let magnitude = u64::from(value.unsigned_abs());
        self.write_varint((magnitude << 1) | u64::from(value < 0));
    }

    /// Write a length-and-type prefixed string
    pub fn write_js_string(&mut self, value: &JsString) -> Result<()> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_STRING_LEN {
            return Err(BytecodeError::LengthOverflow {
                what: "string",
                len: bytes.len(),
            });
        }
        self.write_leb128(((bytes.len() as u32) << 1) | u32::from(value.is_wide()));
        self.write_bytes(bytes);
        Ok(())
    }

    /// Write a collection length as an unsigned varint
    pub fn write_len(&mut self, what: &'static str, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| BytecodeError::LengthOverflow { what, len })?;
        self.write_leb128(len);
        Ok(())
    }
}
