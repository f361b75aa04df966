//! Token generation and verification.
//!
//! # Verification order
//!
//! 1. Decrypt the token.
//! 2. Split the plaintext into fields and the trailing digest.
//! 3. Recompute the digest over the fields and compare.
//! 4. Require the expiration to be strictly in the future.
//! 5. Compare the embedded binding with the caller's, if the generator binds.
//! 6. Decode the payload.
//!
//! The first failing step yields a [`Rejection`]. Callers of the `verify`
//! family only ever see [`TokenError::Invalid`]; the rejection reason is
//! logged at `debug` and exposed through [`TokenGenerator::check`] for
//! diagnostics.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bytes::Bytes;
use common::{Binding, TokenError, Value};
use thiserror::Error;
use tracing::debug;

use crate::codec::{self, fields::header_len, Fields, Header};
use crate::crypto::{cipher, digest, digests_equal, DIGEST_LEN};
use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current time, in whole seconds since the Unix epoch.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// An opaque sealed token.
///
/// The raw bytes are binary and not safe to embed in text; use
/// [`Token::to_base64`] for cookies and headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(Bytes);

impl Token {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// URL-safe base64 without padding.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    /// Parse the output of [`Token::to_base64`].
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Invalid`] if the string is not valid base64.
    pub fn from_base64(s: &str) -> Result<Self, TokenError> {
        URL_SAFE_NO_PAD
            .decode(s.trim())
            .map(Self::from_bytes)
            .map_err(|_| TokenError::Invalid)
    }
}

impl AsRef<[u8]> for Token {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Token {
    fn from(v: Vec<u8>) -> Self {
        Self::from_bytes(v)
    }
}

impl From<&'static [u8]> for Token {
    fn from(v: &'static [u8]) -> Self {
        Self::from_bytes(v)
    }
}

// ---------------------------------------------------------------------------
// Verification results
// ---------------------------------------------------------------------------

/// Why a token was rejected. Internal detail; never returned by `verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("decryption failed")]
    Decrypt,
    #[error("token too short")]
    Truncated,
    #[error("digest mismatch")]
    DigestMismatch,
    #[error("token expired")]
    Expired,
    #[error("binding mismatch")]
    BindingMismatch,
    #[error("binding required but not supplied")]
    BindingMissing,
    #[error("payload does not match format")]
    Payload,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Decrypt => "decrypt",
            Rejection::Truncated => "truncated",
            Rejection::DigestMismatch => "digest_mismatch",
            Rejection::Expired => "expired",
            Rejection::BindingMismatch => "binding_mismatch",
            Rejection::BindingMissing => "binding_missing",
            Rejection::Payload => "payload",
        }
    }
}

impl From<Rejection> for TokenError {
    fn from(_: Rejection) -> Self {
        TokenError::Invalid
    }
}

/// A successfully verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub payload: Value,
    /// Expiration embedded in the verified token.
    pub expires_at: SystemTime,
    /// Replacement token with the extended expiration, if one was requested.
    pub replacement: Option<Token>,
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Generates and verifies tokens for one fixed [`Settings`].
///
/// Immutable once built; share it freely across threads.
#[derive(Clone)]
pub struct TokenGenerator {
    settings: Settings,
    clock: Arc<dyn Clock>,
}

impl TokenGenerator {
    /// Create a generator using the system clock.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Seal `payload` into a token that expires at `expires`.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Format`] if the payload does not fit the format.
    /// - [`TokenError::ExpiryOutOfRange`] if `expires` does not fit in 32-bit
    ///   epoch seconds.
    /// - [`TokenError::BindingRequired`] / [`TokenError::BindingNotConfigured`]
    ///   if `binding` disagrees with the generator's binding mode.
    pub fn generate(
        &self,
        payload: &Value,
        binding: Option<Binding>,
        expires: SystemTime,
    ) -> Result<Token, TokenError> {
        let binding = match (self.settings.binds_address(), binding) {
            (true, None) => return Err(TokenError::BindingRequired),
            (false, Some(_)) => return Err(TokenError::BindingNotConfigured),
            (_, binding) => binding,
        };
        let fields = Fields {
            binding,
            expires: epoch_secs(expires)?,
            payload: payload.clone(),
        };

        let mut sealed = fields.encode(self.settings.format())?;
        let tag = digest(&sealed);
        sealed.extend_from_slice(&tag);

        let s = &self.settings;
        // Length errors cannot occur here: Settings validated them.
        let ciphertext = cipher::encrypt(&sealed, s.cipher(), s.key(), s.iv()).map_err(|e| {
            debug!(error = %e, cipher = %s.cipher(), "token encryption failed");
            TokenError::from(e)
        })?;
        Ok(Token::from_bytes(ciphertext))
    }

    /// Run the ordered verification checks and report the first failure.
    ///
    /// Intended for diagnostics and tests; external callers should use
    /// [`TokenGenerator::verify`], which does not reveal the reason.
    pub fn check(&self, token: &[u8], binding: Option<Binding>) -> Result<Fields, Rejection> {
        let s = &self.settings;
        let bound = s.binds_address();

        let plain =
            cipher::decrypt(token, s.cipher(), s.key(), s.iv()).map_err(|_| Rejection::Decrypt)?;

        if plain.len() < header_len(bound) + DIGEST_LEN {
            return Err(Rejection::Truncated);
        }
        let (fields, tag) = plain.split_at(plain.len() - DIGEST_LEN);

        if !digests_equal(&digest(fields), tag) {
            return Err(Rejection::DigestMismatch);
        }

        let (header, payload) = Header::split(fields, bound).map_err(|_| Rejection::Truncated)?;

        if u64::from(header.expires) <= self.clock.now() {
            return Err(Rejection::Expired);
        }

        if bound {
            match (header.binding, binding) {
                (_, None) => return Err(Rejection::BindingMissing),
                (Some(embedded), Some(given)) if embedded == given => {}
                _ => return Err(Rejection::BindingMismatch),
            }
        } else if binding.is_some() {
            debug!("binding supplied to an unbound generator; ignoring");
        }

        let payload = codec::decode(payload, s.format()).map_err(|_| Rejection::Payload)?;

        Ok(Fields {
            binding: header.binding,
            expires: header.expires,
            payload,
        })
    }

    /// Verify `token` and return its payload.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Invalid`] for every verification failure.
    pub fn verify(&self, token: &Token, binding: Option<Binding>) -> Result<Value, TokenError> {
        self.verify_with(token, binding, None).map(|v| v.payload)
    }

    /// Verify `token` and mint a replacement that expires at `new_expires`.
    ///
    /// The original token stays valid until its own expiration.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Invalid`] for every verification failure, and
    /// [`TokenError::ExpiryOutOfRange`] if `new_expires` is unrepresentable.
    pub fn verify_and_extend(
        &self,
        token: &Token,
        binding: Option<Binding>,
        new_expires: SystemTime,
    ) -> Result<(Value, Token), TokenError> {
        let verified = self.verify_with(token, binding, Some(new_expires))?;
        let replacement = verified.replacement.ok_or(TokenError::Invalid)?;
        Ok((verified.payload, replacement))
    }

    /// Verify `token`, optionally minting a replacement.
    ///
    /// # Errors
    ///
    /// As for [`TokenGenerator::verify_and_extend`].
    pub fn verify_with(
        &self,
        token: &Token,
        binding: Option<Binding>,
        extend_expires: Option<SystemTime>,
    ) -> Result<Verified, TokenError> {
        let fields = self.check(token.as_bytes(), binding).map_err(|reason| {
            debug!(reason = reason.as_str(), "token rejected");
            TokenError::from(reason)
        })?;

        let replacement = match extend_expires {
            Some(expires) => {
                let token = self.generate(&fields.payload, fields.binding, expires)?;
                debug!("replacement token issued");
                Some(token)
            }
            None => None,
        };

        Ok(Verified {
            payload: fields.payload,
            expires_at: UNIX_EPOCH + Duration::from_secs(u64::from(fields.expires)),
            replacement,
        })
    }
}

impl std::fmt::Debug for TokenGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGenerator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn epoch_secs(t: SystemTime) -> Result<u32, TokenError> {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map_err(|_| TokenError::ExpiryOutOfRange)?
        .as_secs();
    u32::try_from(secs).map_err(|_| TokenError::ExpiryOutOfRange)
}
