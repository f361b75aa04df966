//! Integrity and confidentiality primitives for sealed tokens.
//!
//! This module has no knowledge of token fields or expiry. It provides the
//! digest and the symmetric cipher used by [`crate::token`].
//!
//! # Sealed blob format
//!
//! ```text
//! Encrypt_{cipher,key,iv}( fields ++ SHA256(fields) )
//! ```
//!
//! The digest is appended as 32 raw bytes.

pub mod cipher;
pub mod digest;

pub use cipher::{CipherError, CipherKind};
pub use digest::{digest, digests_equal, DIGEST_LEN};
