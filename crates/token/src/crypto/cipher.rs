//! Symmetric encryption and decryption of sealed token blobs.
//!
//! **Cipher choice:** the CTR modes are stream modes with no authentication
//! of their own; integrity comes from the digest sealed inside the
//! plaintext. `aes-256-gcm-siv` (RFC 8452) is the authenticated option and
//! rejects a modified token before the digest is even looked at.
//!
//! **The iv is fixed per configuration.** Every token sealed under one
//! configuration shares a CTR keystream, so tokens must be treated as
//! opaque and never as a place to put secrets the holder may not learn by
//! XOR-ing two tokens together. GCM-SIV is nonce-misuse-resistant and only
//! leaks equality of identical plaintexts.

use std::{fmt, str::FromStr};

use aes_gcm_siv::{
    aead::{Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use common::{ConfigError, TokenError};
use ctr::cipher::{KeyIvInit, StreamCipher};
use thiserror::Error;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Byte length of an AES block, and therefore of a CTR iv.
pub const CTR_IV_LEN: usize = 16;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Supported symmetric ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherKind {
    Aes128Ctr,
    Aes192Ctr,
    #[default]
    Aes256Ctr,
    Aes256GcmSiv,
}

impl CipherKind {
    pub const ALL: [CipherKind; 4] = [
        CipherKind::Aes128Ctr,
        CipherKind::Aes192Ctr,
        CipherKind::Aes256Ctr,
        CipherKind::Aes256GcmSiv,
    ];

    /// Canonical identifier, e.g. `"aes-256-ctr"`.
    pub fn name(self) -> &'static str {
        match self {
            CipherKind::Aes128Ctr => "aes-128-ctr",
            CipherKind::Aes192Ctr => "aes-192-ctr",
            CipherKind::Aes256Ctr => "aes-256-ctr",
            CipherKind::Aes256GcmSiv => "aes-256-gcm-siv",
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            CipherKind::Aes128Ctr => 16,
            CipherKind::Aes192Ctr => 24,
            CipherKind::Aes256Ctr | CipherKind::Aes256GcmSiv => 32,
        }
    }

    pub fn iv_len(self) -> usize {
        match self {
            CipherKind::Aes256GcmSiv => NONCE_LEN,
            _ => CTR_IV_LEN,
        }
    }

    /// Whether the cipher authenticates the ciphertext itself.
    pub fn is_authenticated(self) -> bool {
        matches!(self, CipherKind::Aes256GcmSiv)
    }

    /// Check key and iv lengths against this cipher.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKeyLength`] or
    /// [`ConfigError::InvalidIvLength`] naming the expected size.
    pub fn check_lengths(self, key: &[u8], iv: &[u8]) -> Result<(), ConfigError> {
        if key.len() != self.key_len() {
            return Err(ConfigError::InvalidKeyLength {
                cipher: self.name(),
                expected: self.key_len(),
                actual: key.len(),
            });
        }
        if iv.len() != self.iv_len() {
            return Err(ConfigError::InvalidIvLength {
                cipher: self.name(),
                expected: self.iv_len(),
                actual: iv.len(),
            });
        }
        Ok(())
    }

    /// Fresh random key of the right size, from the OS CSPRNG.
    pub fn generate_key(self) -> Vec<u8> {
        random_bytes(self.key_len())
    }

    /// Fresh random iv of the right size, from the OS CSPRNG.
    pub fn generate_iv(self) -> Vec<u8> {
        random_bytes(self.iv_len())
    }
}

impl FromStr for CipherKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CipherKind::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownCipher(s.to_owned()))
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors produced by the cipher layer.
///
/// Primitive errors are converted here and never leave this module raw.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length for the cipher.
    #[error("invalid key length")]
    InvalidKeyLength,

    /// The iv is the wrong length for the cipher.
    #[error("invalid iv length")]
    InvalidIvLength,

    /// AES-GCM-SIV encryption or decryption failed.
    #[error("aead operation failed")]
    AeadFailure,
}

impl From<CipherError> for TokenError {
    fn from(e: CipherError) -> Self {
        TokenError::Encryption(e.to_string())
    }
}

/// Encrypt `plaintext` with the given cipher, key and iv.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] or [`CipherError::InvalidIvLength`]
/// if the key or iv do not fit the cipher, and [`CipherError::AeadFailure`] on
/// an internal AEAD error.
pub fn encrypt(
    plaintext: &[u8],
    cipher: CipherKind,
    key: &[u8],
    iv: &[u8],
) -> Result<Vec<u8>, CipherError> {
    check(cipher, key, iv)?;
    match cipher {
        CipherKind::Aes256GcmSiv => build_aead(key)?
            .encrypt(Nonce::from_slice(iv), plaintext)
            .map_err(|_| CipherError::AeadFailure),
        _ => {
            let mut buf = plaintext.to_vec();
            apply_keystream(cipher, key, iv, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decrypt `ciphertext` with the given cipher, key and iv.
///
/// # Errors
///
/// Returns [`CipherError::AeadFailure`] if authentication fails (wrong key or
/// tampered data) or the ciphertext is shorter than the tag. Length errors as
/// for [`encrypt`].
pub fn decrypt(
    ciphertext: &[u8],
    cipher: CipherKind,
    key: &[u8],
    iv: &[u8],
) -> Result<Vec<u8>, CipherError> {
    check(cipher, key, iv)?;
    match cipher {
        CipherKind::Aes256GcmSiv => build_aead(key)?
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CipherError::AeadFailure),
        _ => {
            let mut buf = ciphertext.to_vec();
            apply_keystream(cipher, key, iv, &mut buf)?;
            Ok(buf)
        }
    }
}

fn check(cipher: CipherKind, key: &[u8], iv: &[u8]) -> Result<(), CipherError> {
    cipher.check_lengths(key, iv).map_err(|e| match e {
        ConfigError::InvalidIvLength { .. } => CipherError::InvalidIvLength,
        _ => CipherError::InvalidKeyLength,
    })
}

fn apply_keystream(
    cipher: CipherKind,
    key: &[u8],
    iv: &[u8],
    buf: &mut [u8],
) -> Result<(), CipherError> {
    match cipher {
        CipherKind::Aes128Ctr => ctr_keystream::<Aes128Ctr>(key, iv, buf),
        CipherKind::Aes192Ctr => ctr_keystream::<Aes192Ctr>(key, iv, buf),
        CipherKind::Aes256Ctr => ctr_keystream::<Aes256Ctr>(key, iv, buf),
        CipherKind::Aes256GcmSiv => Err(CipherError::AeadFailure),
    }
}

// CTR is symmetric: the same keystream encrypts and decrypts.
fn ctr_keystream<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), CipherError>
where
    C: KeyIvInit + StreamCipher,
{
    let mut c = C::new_from_slices(key, iv).map_err(|_| CipherError::InvalidKeyLength)?;
    c.apply_keystream(buf);
    Ok(())
}

fn build_aead(key: &[u8]) -> Result<Aes256GcmSiv, CipherError> {
    Aes256GcmSiv::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}

fn random_bytes(len: usize) -> Vec<u8> {
    use aes_gcm_siv::aead::rand_core::RngCore;
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}
