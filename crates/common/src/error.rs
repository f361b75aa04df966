//! Common error types shared across crates.

use thiserror::Error;

/// Invalid generator configuration.
///
/// These are programmer errors, reported at construction or reconfiguration
/// time rather than while handling attacker-supplied tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The cipher identifier is not one of the supported ciphers.
    #[error("unknown cipher: {0}")]
    UnknownCipher(String),

    /// The key does not have the length the cipher requires.
    #[error("invalid key length for {cipher}: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        cipher: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The iv does not have the length the cipher requires.
    #[error("invalid iv length for {cipher}: expected {expected} bytes, got {actual}")]
    InvalidIvLength {
        cipher: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A fixed-length string slot is larger than the codec accepts.
    #[error("fixed string length {len} exceeds the maximum of {max}")]
    FixedStringTooLong { len: usize, max: usize },
}

/// Errors produced by the field codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The byte length does not match the length implied by the descriptor.
    #[error("format mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The value's shape does not fit the descriptor.
    #[error("value does not match format: expected {expected}")]
    ValueMismatch { expected: String },

    /// A scalar value does not fit in the descriptor's integer width.
    #[error("scalar {value} out of range for {kind}")]
    ScalarOutOfRange { kind: &'static str, value: i128 },

    /// A string is longer than its fixed-length slot.
    #[error("string of {actual} bytes exceeds fixed length {max}")]
    StringTooLong { max: usize, actual: usize },

    /// String bytes in the payload are not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
}

/// A binding string is not a dotted-quad IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid binding address: {0:?}")]
pub struct BindingParseError(pub String);

/// Top-level token error type.
///
/// Every verification failure (decryption, digest, expiry, binding) is
/// reported as the single [`TokenError::Invalid`] variant so that callers
/// cannot tell a tampered token from an expired one.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token did not pass verification.
    #[error("token is invalid")]
    Invalid,

    /// The generator configuration is invalid.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The payload could not be serialised with the configured format.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// The expiration cannot be represented as 32-bit seconds since the epoch.
    #[error("expiration out of range for a 32-bit timestamp")]
    ExpiryOutOfRange,

    /// The generator binds tokens to an address but none was supplied.
    #[error("a binding is required by this generator")]
    BindingRequired,

    /// A binding was supplied to a generator that does not bind tokens.
    #[error("this generator is not configured for bindings")]
    BindingNotConfigured,

    /// Sealing a new token failed inside the cipher.
    #[error("token encryption failed: {0}")]
    Encryption(String),
}

impl TokenError {
    /// Returns `true` for the umbrella verification failure.
    pub fn is_invalid(&self) -> bool {
        matches!(self, TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_display_is_opaque() {
        assert_eq!(TokenError::Invalid.to_string(), "token is invalid");
        assert!(TokenError::Invalid.is_invalid());
    }

    #[test]
    fn config_error_converts() {
        let e: TokenError = ConfigError::UnknownCipher("rot13".into()).into();
        assert!(matches!(e, TokenError::Configuration(_)));
        assert!(e.to_string().contains("rot13"));
        assert!(!e.is_invalid());
    }

    #[test]
    fn length_mismatch_display() {
        let e = FormatError::LengthMismatch {
            expected: 4,
            actual: 7,
        };
        assert_eq!(e.to_string(), "format mismatch: expected 4 bytes, got 7");
    }

    #[test]
    fn key_length_display_names_cipher() {
        let e = ConfigError::InvalidKeyLength {
            cipher: "aes-256-ctr",
            expected: 32,
            actual: 16,
        };
        assert!(e.to_string().contains("aes-256-ctr"));
        assert!(e.to_string().contains("32"));
    }
}
