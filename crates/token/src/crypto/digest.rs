//! SHA-256 digest over serialised token fields.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Byte length of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

pub type Tag = [u8; DIGEST_LEN];

/// Compute the digest of `bytes`.
pub fn digest(bytes: &[u8]) -> Tag {
    Sha256::digest(bytes).into()
}

/// Compare two digests in constant time.
///
/// Inputs of different length compare unequal.
pub fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
