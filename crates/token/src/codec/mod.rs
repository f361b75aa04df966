//! Deterministic, big-endian serialisation of token fields.
//!
//! # Byte layout
//!
//! ```text
//! [binding: 4 bytes]? ++ expires: u32 BE ++ payload
//! ```
//!
//! The payload layout follows its [`Format`]:
//!
//! - `Scalar(kind)`: `kind.width()` bytes, big-endian two's complement.
//!   Unsigned kinds take [`Value::Unsigned`], signed kinds [`Value::Signed`].
//! - `FixedString(n)`: exactly `n` bytes, NUL padded. Trailing NULs are
//!   stripped on decode, so a value may not end in NUL.
//! - `VarString`: `u32` BE byte length, then the UTF-8 bytes.
//! - `Sequence(..)`: members back to back, in order.
//!
//! This module has no crypto dependencies.

pub mod fields;

pub use fields::{Fields, Header};

use common::{Format, FormatError, ScalarKind, Value};

/// Serialise a payload value according to `format`.
///
/// # Errors
///
/// Returns a [`FormatError`] if the value's shape does not fit the format,
/// a scalar is out of range for its kind, or a string exceeds its slot.
pub fn encode(value: &Value, format: &Format) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::with_capacity(capacity_hint(format));
    encode_into(value, format, &mut out)?;
    Ok(out)
}

pub(crate) fn encode_into(
    value: &Value,
    format: &Format,
    out: &mut Vec<u8>,
) -> Result<(), FormatError> {
    match (format, value) {
        (Format::Scalar(kind), Value::Unsigned(n)) if !kind.is_signed() => {
            encode_scalar(*kind, i128::from(*n), out)
        }
        (Format::Scalar(kind), Value::Signed(n)) if kind.is_signed() => {
            encode_scalar(*kind, i128::from(*n), out)
        }
        (Format::FixedString(len), Value::Text(s)) => {
            let bytes = s.as_bytes();
            // Trailing NULs are indistinguishable from padding.
            if *len > Format::MAX_FIXED_LEN || bytes.last() == Some(&0) {
                return Err(mismatch(format));
            }
            if bytes.len() > *len {
                return Err(FormatError::StringTooLong {
                    max: *len,
                    actual: bytes.len(),
                });
            }
            out.extend_from_slice(bytes);
            out.resize(out.len() + (*len - bytes.len()), 0);
            Ok(())
        }
        (Format::VarString, Value::Text(s)) => {
            let len = u32::try_from(s.len()).map_err(|_| FormatError::StringTooLong {
                max: u32::MAX as usize,
                actual: s.len(),
            })?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }
        (Format::Sequence(formats), Value::Sequence(values)) if formats.len() == values.len() => {
            for (f, v) in formats.iter().zip(values) {
                encode_into(v, f, out)?;
            }
            Ok(())
        }
        _ => Err(mismatch(format)),
    }
}

pub(crate) fn capacity_hint(format: &Format) -> usize {
    format
        .encoded_len()
        .map_or(16, |n| n.min(Format::MAX_FIXED_LEN))
}

fn encode_scalar(kind: ScalarKind, n: i128, out: &mut Vec<u8>) -> Result<(), FormatError> {
    let (lo, hi) = kind.range();
    if n < lo || n > hi {
        return Err(FormatError::ScalarOutOfRange {
            kind: kind.name(),
            value: n,
        });
    }
    let bytes = n.to_be_bytes();
    out.extend_from_slice(&bytes[bytes.len() - kind.width()..]);
    Ok(())
}

/// Deserialise a payload value; the exact inverse of [`encode`].
///
/// Signed kinds decode to [`Value::Signed`], unsigned kinds to
/// [`Value::Unsigned`].
///
/// # Errors
///
/// Returns [`FormatError::LengthMismatch`] if `bytes` is shorter or longer
/// than the length the format implies, and [`FormatError::InvalidUtf8`] for
/// malformed string bytes.
pub fn decode(bytes: &[u8], format: &Format) -> Result<Value, FormatError> {
    if let Some(expected) = format.encoded_len() {
        if expected != bytes.len() {
            return Err(FormatError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
    }
    let mut reader = Reader::new(bytes);
    let value = decode_from(&mut reader, format)?;
    reader.finish()?;
    Ok(value)
}

fn decode_from(r: &mut Reader<'_>, format: &Format) -> Result<Value, FormatError> {
    match format {
        Format::Scalar(kind) => {
            let width = kind.width();
            let mut buf = [0u8; 8];
            buf[8 - width..].copy_from_slice(r.take(width)?);
            let raw = u64::from_be_bytes(buf);
            if kind.is_signed() {
                let shift = 64 - 8 * width as u32;
                Ok(Value::Signed(((raw << shift) as i64) >> shift))
            } else {
                Ok(Value::Unsigned(raw))
            }
        }
        Format::FixedString(len) => {
            let raw = r.take(*len)?;
            let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            utf8(&raw[..end])
        }
        Format::VarString => {
            let len = r.read_u32()? as usize;
            utf8(r.take(len)?)
        }
        Format::Sequence(formats) => formats
            .iter()
            .map(|f| decode_from(r, f))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
    }
}

fn utf8(bytes: &[u8]) -> Result<Value, FormatError> {
    std::str::from_utf8(bytes)
        .map(|s| Value::Text(s.to_owned()))
        .map_err(|_| FormatError::InvalidUtf8)
}

fn mismatch(format: &Format) -> FormatError {
    FormatError::ValueMismatch {
        expected: format.to_string(),
    }
}

/// Bounds-checked cursor over an input buffer.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(FormatError::LengthMismatch {
                expected: self.pos.saturating_add(n),
                actual: self.buf.len(),
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, FormatError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    /// Fails if any bytes are left unread.
    pub(crate) fn finish(&self) -> Result<(), FormatError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(FormatError::LengthMismatch {
                expected: self.pos,
                actual: self.buf.len(),
            })
        }
    }
}
