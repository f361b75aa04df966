//! Sealed, time-bound session tokens.
//!
//! A token is the symmetric encryption of a fixed-layout field blob
//! (optional requester binding, expiration, payload) followed by its SHA-256
//! digest. Verification needs no server-side state: it decrypts, checks the
//! digest, the expiration and the binding, and optionally issues a
//! replacement token with a later expiration.
//!
//! ```text
//! token  = Encrypt_{cipher,key,iv}( fields ++ SHA256(fields) )
//! fields = [binding: 4 bytes]? ++ expires: u32 BE ++ payload
//! ```
//!
//! # Modules
//!
//! - [`codec`]: field serialisation per payload [`Format`].
//! - [`crypto`]: digest and cipher primitives.
//! - [`settings`]: validated configuration and the [`DefaultStore`].
//! - [`token`]: [`TokenGenerator`], generation and verification.
//! - [`config`]: loading [`Settings`] from `TOKEN_*` environment variables.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod settings;
pub mod token;

pub use common::{Binding, ConfigError, Format, FormatError, ScalarKind, TokenError, Value};
pub use crate::config::TokenConfig;
pub use crate::crypto::CipherKind;
pub use crate::settings::{DefaultStore, Settings};
pub use crate::token::{Clock, Rejection, SystemClock, Token, TokenGenerator, Verified};
