//! Loading generator settings from environment variables.
//!
//! | Variable             | Meaning                              | Default            |
//! |----------------------|--------------------------------------|--------------------|
//! | `TOKEN_CIPHER`       | cipher identifier                    | `aes-256-ctr`      |
//! | `TOKEN_KEY`          | base64 key bytes. **Required.**      |                    |
//! | `TOKEN_IV`           | base64 iv bytes. **Required.**       |                    |
//! | `TOKEN_FORMAT`       | JSON payload format descriptor       | `{"scalar":"u32"}` |
//! | `TOKEN_BIND_ADDRESS` | bind tokens to the requester address | `true`             |

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::Format;
use serde::Deserialize;

use crate::crypto::CipherKind;
use crate::settings::Settings;

/// Raw token configuration as read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Cipher identifier, e.g. `"aes-256-ctr"`.
    #[serde(default = "default_cipher")]
    pub cipher: String,

    /// Base64 (standard alphabet) key bytes. **Required.**
    pub key: String,

    /// Base64 (standard alphabet) iv bytes. **Required.**
    pub iv: String,

    /// JSON-encoded [`Format`].
    #[serde(default = "default_format")]
    pub format: String,

    /// Whether tokens carry the requester's address.
    #[serde(default = "default_bind_address")]
    pub bind_address: bool,
}

fn default_cipher() -> String {
    CipherKind::default().name().into()
}
fn default_format() -> String {
    r#"{"scalar":"u32"}"#.into()
}
fn default_bind_address() -> bool {
    true
}

impl TokenConfig {
    /// Load and validate configuration from `TOKEN_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("TOKEN").try_parsing(true))
            .build()
            .context("failed to build token configuration from environment")?;

        let c: TokenConfig = cfg
            .try_deserialize()
            .context("failed to deserialise token configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.key, "TOKEN_KEY")?;
        ensure_non_empty(&self.iv, "TOKEN_IV")?;
        ensure_non_empty(&self.cipher, "TOKEN_CIPHER")?;
        Ok(())
    }

    /// Decode key material and the format descriptor into validated
    /// [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher is unknown, the key or iv are not
    /// valid base64 or have the wrong length, or the format is not valid JSON
    /// or has an oversized fixed-length slot.
    pub fn into_settings(self) -> Result<Settings> {
        let cipher: CipherKind = self.cipher.parse().context("TOKEN_CIPHER is invalid")?;
        let key = STANDARD
            .decode(self.key.trim())
            .context("TOKEN_KEY is not valid base64")?;
        let iv = STANDARD
            .decode(self.iv.trim())
            .context("TOKEN_IV is not valid base64")?;
        let format: Format =
            serde_json::from_str(&self.format).context("TOKEN_FORMAT is not a valid format")?;

        let settings = Settings::new(cipher, &key, &iv, format)
            .context("token settings are invalid")?;
        Ok(settings.with_binding(self.bind_address))
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
