//! Generator configuration: cipher, key, iv, payload format, binding mode.
//!
//! # Lifecycle
//!
//! 1. A [`Settings`] value is validated once, at construction, and is
//!    immutable afterwards.
//! 2. A [`crate::TokenGenerator`] takes ownership of one `Settings`.
//! 3. Applications that do not manage keys themselves use a [`DefaultStore`],
//!    which creates random default settings lazily and can be reset.
//!
//! # Security invariants
//!
//! - Key material is never logged. `Debug` output is redacted.
//! - Key buffers are zeroed on drop.

pub mod store;

pub use store::DefaultStore;

use common::{ConfigError, Format};

use crate::crypto::CipherKind;

/// Owned key buffer.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which key material lives in RAM.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBytes(Box<[u8]>);

impl KeyBytes {
    pub fn new(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// Validated generator configuration.
#[derive(Clone)]
pub struct Settings {
    cipher: CipherKind,
    key: KeyBytes,
    iv: Vec<u8>,
    format: Format,
    bind_address: bool,
}

impl Settings {
    /// Build settings from explicit key material.
    ///
    /// Tokens are bound to a requester address by default; see
    /// [`Settings::with_binding`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKeyLength`] or
    /// [`ConfigError::InvalidIvLength`] if the key or iv do not fit `cipher`,
    /// and [`ConfigError::FixedStringTooLong`] for an oversized format.
    pub fn new(
        cipher: CipherKind,
        key: &[u8],
        iv: &[u8],
        format: Format,
    ) -> Result<Self, ConfigError> {
        cipher.check_lengths(key, iv)?;
        format.validate()?;
        Ok(Self {
            cipher,
            key: KeyBytes::new(key),
            iv: iv.to_vec(),
            format,
            bind_address: true,
        })
    }

    /// Settings with a freshly generated key and iv sized for `cipher`.
    pub fn random(cipher: CipherKind, format: Format) -> Self {
        Self {
            cipher,
            key: KeyBytes::new(&cipher.generate_key()),
            iv: cipher.generate_iv(),
            format,
            bind_address: true,
        }
    }

    /// Enable or disable the requester binding field.
    pub fn with_binding(mut self, bind_address: bool) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    pub fn key(&self) -> &[u8] {
        self.key.as_bytes()
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Whether tokens carry a requester binding.
    pub fn binds_address(&self) -> bool {
        self.bind_address
    }

    /// Switch cipher. A different cipher always gets a fresh key; the iv is
    /// kept only if it already has the size the new cipher requires.
    pub(crate) fn with_cipher(mut self, cipher: CipherKind) -> Self {
        if self.cipher == cipher {
            return self;
        }
        self.key = KeyBytes::new(&cipher.generate_key());
        if self.cipher.iv_len() != cipher.iv_len() {
            self.iv = cipher.generate_iv();
        }
        self.cipher = cipher;
        self
    }

    pub(crate) fn with_key(mut self, key: &[u8]) -> Result<Self, ConfigError> {
        self.cipher.check_lengths(key, &self.iv)?;
        self.key = KeyBytes::new(key);
        Ok(self)
    }

    pub(crate) fn with_iv(mut self, iv: &[u8]) -> Result<Self, ConfigError> {
        self.cipher.check_lengths(self.key.as_bytes(), iv)?;
        self.iv = iv.to_vec();
        Ok(self)
    }

    pub(crate) fn with_format(mut self, format: Format) -> Result<Self, ConfigError> {
        format.validate()?;
        self.format = format;
        Ok(self)
    }
}

impl Default for Settings {
    /// `aes-256-ctr` with a random key and iv, a `u32` payload, and address
    /// binding enabled.
    fn default() -> Self {
        Self::random(CipherKind::default(), Format::default())
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("cipher", &self.cipher)
            .field("key", &self.key)
            .field("iv", &"[REDACTED]")
            .field("format", &self.format)
            .field("bind_address", &self.bind_address)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ScalarKind;

    #[test]
    fn new_validates_lengths() {
        let kind = CipherKind::Aes256Ctr;
        assert!(Settings::new(kind, &[0u8; 32], &[0u8; 16], Format::default()).is_ok());
        assert!(matches!(
            Settings::new(kind, &[0u8; 16], &[0u8; 16], Format::default()),
            Err(ConfigError::InvalidKeyLength { expected: 32, actual: 16, .. })
        ));
        assert!(matches!(
            Settings::new(kind, &[0u8; 32], &[0u8; 12], Format::default()),
            Err(ConfigError::InvalidIvLength { expected: 16, actual: 12, .. })
        ));
    }

    #[test]
    fn random_sizes_match_cipher() {
        for kind in CipherKind::ALL {
            let s = Settings::random(kind, Format::VarString);
            assert_eq!(s.key().len(), kind.key_len());
            assert_eq!(s.iv().len(), kind.iv_len());
        }
    }

    #[test]
    fn default_settings() {
        let s = Settings::default();
        assert_eq!(s.cipher(), CipherKind::Aes256Ctr);
        assert_eq!(s.format(), &Format::Scalar(ScalarKind::U32));
        assert!(s.binds_address());
        assert!(!s.with_binding(false).binds_address());
    }

    #[test]
    fn switching_cipher_regenerates_mismatched_material() {
        let s = Settings::random(CipherKind::Aes256Ctr, Format::default());
        let old_key = s.key().to_vec();
        let switched = s.with_cipher(CipherKind::Aes128Ctr);
        assert_eq!(switched.key().len(), 16);
        assert_ne!(switched.key(), &old_key[..16]);
        assert_eq!(switched.iv().len(), 16);

        let siv = switched.with_cipher(CipherKind::Aes256GcmSiv);
        assert_eq!(siv.key().len(), 32);
        assert_eq!(siv.iv().len(), 12);
    }

    #[test]
    fn same_size_cipher_switch_still_gets_a_new_key() {
        let ctr = Settings::random(CipherKind::Aes256Ctr, Format::default());
        let siv = ctr.clone().with_cipher(CipherKind::Aes256GcmSiv);
        assert_eq!(siv.key().len(), ctr.key().len());
        assert_ne!(siv.key(), ctr.key());

        let same = ctr.clone().with_cipher(CipherKind::Aes256Ctr);
        assert_eq!(same.key(), ctr.key());
        assert_eq!(same.iv(), ctr.iv());
    }

    #[test]
    fn with_key_rejects_wrong_length() {
        let s = Settings::default();
        assert!(s.clone().with_key(&[1u8; 31]).is_err());
        assert_eq!(s.with_key(&[1u8; 32]).unwrap().key(), &[1u8; 32]);
    }

    #[test]
    fn oversized_fixed_string_is_a_config_error() {
        let huge = Format::Sequence(vec![Format::FixedString(usize::MAX)]);
        assert!(matches!(
            Settings::new(CipherKind::Aes256Ctr, &[0u8; 32], &[0u8; 16], huge.clone()),
            Err(ConfigError::FixedStringTooLong { .. })
        ));
        assert!(Settings::default().with_format(huge).is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let s = Settings::new(CipherKind::Aes256Ctr, &[0xAB; 32], &[0xCD; 16], Format::default())
            .unwrap();
        let out = format!("{s:?}");
        assert!(out.contains("REDACTED"));
        assert!(!out.contains("171"));
        assert!(!out.contains("0xab"));
    }
}
