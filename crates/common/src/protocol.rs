//! Payload format descriptors, payload values, and the request binding.
//!
//! A [`Format`] is fixed per token population: the generator and the verifier
//! must agree on it exactly, otherwise decoding fails with a format mismatch.

use std::{fmt, net::Ipv4Addr, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{BindingParseError, ConfigError};

// ---------------------------------------------------------------------------
// Format descriptor
// ---------------------------------------------------------------------------

/// Width and signedness of a scalar payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl ScalarKind {
    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::U32 | ScalarKind::I32 => 4,
            ScalarKind::U64 | ScalarKind::I64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::U8 => "u8",
            ScalarKind::U16 => "u16",
            ScalarKind::U32 => "u32",
            ScalarKind::U64 => "u64",
            ScalarKind::I8 => "i8",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
        }
    }

    /// Inclusive value range representable by this kind.
    pub fn range(self) -> (i128, i128) {
        let bits = (self.width() * 8) as u32;
        if self.is_signed() {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }
}

/// Schema describing the packed byte layout of a token payload.
///
/// Serialised form (externally tagged, snake case):
///
/// ```text
/// {"scalar":"u32"}
/// {"fixed_string":16}
/// "var_string"
/// {"sequence":[{"scalar":"u32"},"var_string"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Fixed-width big-endian integer.
    Scalar(ScalarKind),
    /// Exactly `n` bytes of UTF-8, NUL padded.
    FixedString(usize),
    /// `u32` big-endian byte length followed by UTF-8 bytes.
    VarString,
    /// Ordered composite of the nested formats.
    Sequence(Vec<Format>),
}

impl Format {
    /// Largest accepted [`Format::FixedString`] slot, in bytes.
    pub const MAX_FIXED_LEN: usize = u16::MAX as usize;

    /// Encoded length in bytes, or `None` if the layout contains a
    /// [`Format::VarString`] or the total does not fit in `usize`.
    pub fn encoded_len(&self) -> Option<usize> {
        match self {
            Format::Scalar(kind) => Some(kind.width()),
            Format::FixedString(len) => Some(*len),
            Format::VarString => None,
            Format::Sequence(items) => items
                .iter()
                .try_fold(0usize, |acc, item| acc.checked_add(item.encoded_len()?)),
        }
    }

    /// Reject descriptors with a fixed-length slot above
    /// [`Format::MAX_FIXED_LEN`], at any nesting depth.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Format::FixedString(len) if *len > Self::MAX_FIXED_LEN => {
                Err(ConfigError::FixedStringTooLong {
                    len: *len,
                    max: Self::MAX_FIXED_LEN,
                })
            }
            Format::Sequence(items) => items.iter().try_for_each(Format::validate),
            _ => Ok(()),
        }
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::Scalar(ScalarKind::U32)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Scalar(kind) => f.write_str(kind.name()),
            Format::FixedString(len) => write!(f, "str[{len}]"),
            Format::VarString => f.write_str("str"),
            Format::Sequence(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Payload values
// ---------------------------------------------------------------------------

/// A payload value carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Text(String),
    Sequence(Vec<Value>),
}

impl Value {
    /// Integer view of a scalar value, if it is one.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Unsigned(v) => Some(i128::from(*v)),
            Value::Signed(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Unsigned(u64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Signed(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Sequence(v)
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Requester IPv4 address a token is bound to, one byte per octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Binding(pub [u8; 4]);

impl Binding {
    pub const LEN: usize = 4;

    pub fn octets(&self) -> [u8; 4] {
        self.0
    }
}

impl From<Ipv4Addr> for Binding {
    fn from(addr: Ipv4Addr) -> Self {
        Binding(addr.octets())
    }
}

impl From<Binding> for Ipv4Addr {
    fn from(b: Binding) -> Self {
        Ipv4Addr::from(b.0)
    }
}

impl FromStr for Binding {
    type Err = BindingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv4Addr>()
            .map(Binding::from)
            .map_err(|_| BindingParseError(s.to_owned()))
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Ipv4Addr::from(self.0), f)
    }
}
