//! Common types, payload format descriptors, and errors shared across the
//! sealed-token crates.

pub mod error;
pub mod protocol;

pub use error::{BindingParseError, ConfigError, FormatError, TokenError};
pub use protocol::{Binding, Format, ScalarKind, Value};
