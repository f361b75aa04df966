//! The fixed field header (binding, expiry) plus the payload.

use common::{Binding, Format, FormatError, Value};

use super::{capacity_hint, decode, encode_into, Reader};

/// Byte length of the expiration field.
pub const EXPIRES_LEN: usize = 4;

/// The ordered set of fields sealed inside a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fields {
    pub binding: Option<Binding>,
    /// Seconds since the Unix epoch.
    pub expires: u32,
    pub payload: Value,
}

/// The fixed-size fields preceding the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub binding: Option<Binding>,
    pub expires: u32,
}

/// Length of the fixed header for the given binding mode.
pub fn header_len(bound: bool) -> usize {
    if bound {
        Binding::LEN + EXPIRES_LEN
    } else {
        EXPIRES_LEN
    }
}

impl Fields {
    /// Serialise `[binding]? ++ expires ++ payload`.
    pub fn encode(&self, format: &Format) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::with_capacity(
            header_len(self.binding.is_some()) + capacity_hint(format),
        );
        if let Some(binding) = self.binding {
            out.extend_from_slice(&binding.octets());
        }
        out.extend_from_slice(&self.expires.to_be_bytes());
        encode_into(&self.payload, format, &mut out)?;
        Ok(out)
    }

    /// Decode all fields at once.
    pub fn decode(bytes: &[u8], bound: bool, format: &Format) -> Result<Self, FormatError> {
        let (header, payload) = Header::split(bytes, bound)?;
        Ok(Self {
            binding: header.binding,
            expires: header.expires,
            payload: decode(payload, format)?,
        })
    }
}

impl Header {
    /// Split serialised fields into the fixed header and the raw payload
    /// bytes, leaving the payload undecoded.
    pub fn split(bytes: &[u8], bound: bool) -> Result<(Self, &[u8]), FormatError> {
        let mut r = Reader::new(bytes);
        let binding = if bound {
            let mut octets = [0u8; Binding::LEN];
            octets.copy_from_slice(r.take(Binding::LEN)?);
            Some(Binding(octets))
        } else {
            None
        };
        let expires = r.read_u32()?;
        Ok((Self { binding, expires }, r.rest()))
    }
}
