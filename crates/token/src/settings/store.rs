//! [`DefaultStore`]: lazily-initialised default settings and generator.
//!
//! The store is an ordinary value owned by the embedding application and
//! passed by reference to whatever needs the default generator. It is not a
//! process global.
//!
//! Reads are lock-free via `arc-swap`. Each setter swaps in a complete new
//! [`Settings`] and drops the cached generator, so later default-path calls
//! observe the change. A *sequence* of setters is not atomic: callers that
//! reconfigure while other threads issue tokens must serialise those
//! reconfigurations themselves.

use std::{sync::Arc, time::SystemTime};

use arc_swap::ArcSwapOption;
use common::{Binding, ConfigError, Format, TokenError, Value};
use tracing::info;

use super::Settings;
use crate::crypto::CipherKind;
use crate::token::{Clock, SystemClock, Token, TokenGenerator};

/// Shared holder for the default configuration and its cached generator.
#[derive(Clone)]
pub struct DefaultStore {
    settings: Arc<ArcSwapOption<Settings>>,
    generator: Arc<ArcSwapOption<TokenGenerator>>,
    clock: Arc<dyn Clock>,
}

impl DefaultStore {
    /// Create an empty store. Nothing is generated until first use.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store whose generators use `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: Arc::new(ArcSwapOption::empty()),
            generator: Arc::new(ArcSwapOption::empty()),
            clock,
        }
    }

    /// Returns `true` once default settings have been established.
    pub fn is_initialised(&self) -> bool {
        self.settings.load().is_some()
    }

    /// Current default settings, establishing them on first use.
    pub fn settings(&self) -> Arc<Settings> {
        if let Some(current) = self.settings.load_full() {
            return current;
        }
        let fresh = Arc::new(Settings::default());
        // Another thread may have won the race; keep whichever landed first.
        let prev = self
            .settings
            .compare_and_swap(&None::<Arc<Settings>>, Some(fresh.clone()));
        match &*prev {
            Some(winner) => winner.clone(),
            None => {
                info!(cipher = %fresh.cipher(), "default token settings established");
                fresh
            }
        }
    }

    /// Discard the current defaults and establish fresh random ones.
    pub fn reset(&self) {
        let fresh = Settings::default();
        info!(cipher = %fresh.cipher(), "default token settings reset");
        self.replace(fresh);
    }

    /// Switch the default cipher.
    ///
    /// A different cipher always gets a fresh random key, even when the key
    /// sizes match. The iv is regenerated when its size differs.
    pub fn set_cipher(&self, cipher: CipherKind) {
        let next = self.current().with_cipher(cipher);
        info!(cipher = %cipher, "default token cipher changed");
        self.replace(next);
    }

    /// Replace the default key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKeyLength`] if `key` does not fit the
    /// current cipher; the store is left unchanged.
    pub fn set_key(&self, key: &[u8]) -> Result<(), ConfigError> {
        let next = self.current().with_key(key)?;
        info!(cipher = %next.cipher(), "default token key changed");
        self.replace(next);
        Ok(())
    }

    /// Replace the default iv.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidIvLength`] if `iv` does not fit the
    /// current cipher; the store is left unchanged.
    pub fn set_iv(&self, iv: &[u8]) -> Result<(), ConfigError> {
        let next = self.current().with_iv(iv)?;
        info!(cipher = %next.cipher(), "default token iv changed");
        self.replace(next);
        Ok(())
    }

    /// Replace the default payload format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FixedStringTooLong`] if the descriptor has an
    /// oversized fixed-length slot; the store is left unchanged.
    pub fn set_format(&self, format: Format) -> Result<(), ConfigError> {
        let next = self.current().with_format(format)?;
        info!(format = %next.format(), "default token format changed");
        self.replace(next);
        Ok(())
    }

    /// Enable or disable address binding for default tokens.
    pub fn set_binding(&self, bind_address: bool) {
        info!(bind_address, "default token binding changed");
        let next = self.current().with_binding(bind_address);
        self.replace(next);
    }

    /// The default generator, built on first use and cached until the next
    /// reconfiguration.
    pub fn generator(&self) -> Arc<TokenGenerator> {
        if let Some(cached) = self.generator.load_full() {
            return cached;
        }
        let built = Arc::new(
            TokenGenerator::new(self.current()).with_clock(self.clock.clone()),
        );
        self.generator.store(Some(built.clone()));
        built
    }

    /// A generator for `settings`, or the default generator when `None`.
    pub fn generator_for(&self, settings: Option<Settings>) -> Arc<TokenGenerator> {
        match settings {
            Some(settings) => {
                Arc::new(TokenGenerator::new(settings).with_clock(self.clock.clone()))
            }
            None => self.generator(),
        }
    }

    /// [`TokenGenerator::generate`] with the default generator.
    pub fn generate(
        &self,
        payload: &Value,
        binding: Option<Binding>,
        expires: SystemTime,
    ) -> Result<Token, TokenError> {
        self.generator().generate(payload, binding, expires)
    }

    /// [`TokenGenerator::verify`] with the default generator.
    pub fn verify(&self, token: &Token, binding: Option<Binding>) -> Result<Value, TokenError> {
        self.generator().verify(token, binding)
    }

    /// [`TokenGenerator::verify_and_extend`] with the default generator.
    pub fn verify_and_extend(
        &self,
        token: &Token,
        binding: Option<Binding>,
        new_expires: SystemTime,
    ) -> Result<(Value, Token), TokenError> {
        self.generator().verify_and_extend(token, binding, new_expires)
    }

    fn current(&self) -> Settings {
        (*self.settings()).clone()
    }

    fn replace(&self, next: Settings) {
        self.settings.store(Some(Arc::new(next)));
        self.generator.store(None);
    }
}

impl Default for DefaultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DefaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultStore")
            .field("initialised", &self.is_initialised())
            .field("generator_cached", &self.generator.load().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::MockClock;
    use common::ScalarKind;
    use std::time::{Duration, UNIX_EPOCH};

    const NOW: u64 = 1_700_000_000;

    fn store() -> DefaultStore {
        let mut clock = MockClock::new();
        clock.expect_now().return_const(NOW);
        DefaultStore::with_clock(Arc::new(clock))
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn local() -> Option<Binding> {
        Some("127.0.0.1".parse().unwrap())
    }

    #[test]
    fn lazily_initialised() {
        let store = store();
        assert!(!store.is_initialised());
        let s = store.settings();
        assert!(store.is_initialised());
        assert_eq!(s.cipher(), CipherKind::Aes256Ctr);
        assert_eq!(s.format(), &Format::Scalar(ScalarKind::U32));
        assert!(Arc::ptr_eq(&s, &store.settings()));
    }

    #[test]
    fn generator_is_cached() {
        let store = store();
        assert!(Arc::ptr_eq(&store.generator(), &store.generator()));
    }

    #[test]
    fn default_path_round_trip() {
        let store = store();
        let token = store.generate(&Value::Unsigned(77), local(), at(NOW + 30)).unwrap();
        assert_eq!(store.verify(&token, local()).unwrap(), Value::Unsigned(77));
        let (value, replacement) = store.verify_and_extend(&token, local(), at(NOW + 90)).unwrap();
        assert_eq!(value, Value::Unsigned(77));
        assert_eq!(store.verify(&replacement, local()).unwrap(), Value::Unsigned(77));
    }

    #[test]
    fn reset_invalidates_generator_and_tokens() {
        let store = store();
        let before = store.generator();
        let token = store.generate(&Value::Unsigned(1), local(), at(NOW + 30)).unwrap();
        store.reset();
        assert!(!Arc::ptr_eq(&before, &store.generator()));
        assert!(store.verify(&token, local()).unwrap_err().is_invalid());
    }

    #[test]
    fn set_cipher_regenerates_material() {
        let store = store();
        let old = store.generator();
        let ctr_key = store.settings().key().to_vec();
        store.set_cipher(CipherKind::Aes256GcmSiv);
        let s = store.settings();
        assert_eq!(s.cipher(), CipherKind::Aes256GcmSiv);
        assert_ne!(s.key(), &ctr_key[..]);
        assert_eq!(s.iv().len(), 12);
        assert!(!Arc::ptr_eq(&old, &store.generator()));

        store.set_cipher(CipherKind::Aes128Ctr);
        assert_eq!(store.settings().key().len(), 16);
        let token = store.generate(&Value::Unsigned(2), local(), at(NOW + 30)).unwrap();
        assert_eq!(store.verify(&token, local()).unwrap(), Value::Unsigned(2));
    }

    #[test]
    fn set_key_and_iv_validate_lengths() {
        let store = store();
        let before = store.settings();
        assert!(matches!(
            store.set_key(&[0u8; 16]),
            Err(ConfigError::InvalidKeyLength { .. })
        ));
        assert!(matches!(
            store.set_iv(&[0u8; 12]),
            Err(ConfigError::InvalidIvLength { .. })
        ));
        assert!(Arc::ptr_eq(&before, &store.settings()));

        store.set_key(&[7u8; 32]).unwrap();
        store.set_iv(&[9u8; 16]).unwrap();
        assert_eq!(store.settings().key(), &[7u8; 32]);
        assert_eq!(store.settings().iv(), &[9u8; 16]);
    }

    #[test]
    fn same_key_and_iv_verify_across_stores() {
        let a = store();
        let b = store();
        for s in [&a, &b] {
            s.set_key(&[3u8; 32]).unwrap();
            s.set_iv(&[4u8; 16]).unwrap();
        }
        let token = a.generate(&Value::Unsigned(5), local(), at(NOW + 30)).unwrap();
        assert_eq!(b.verify(&token, local()).unwrap(), Value::Unsigned(5));
    }

    #[test]
    fn set_format_and_binding_apply() {
        let store = store();
        store.set_format(Format::VarString).unwrap();
        store.set_binding(false);
        let token = store.generate(&Value::from("sid"), None, at(NOW + 30)).unwrap();
        assert_eq!(store.verify(&token, None).unwrap(), Value::from("sid"));
    }

    #[test]
    fn oversized_format_leaves_store_unchanged() {
        let store = store();
        let before = store.settings();
        assert!(store.set_format(Format::FixedString(usize::MAX)).is_err());
        assert!(Arc::ptr_eq(&before, &store.settings()));
    }

    #[test]
    fn explicit_settings_bypass_default() {
        let store = store();
        let explicit = Settings::random(CipherKind::Aes192Ctr, Format::default());
        let gen = store.generator_for(Some(explicit));
        assert_eq!(gen.settings().cipher(), CipherKind::Aes192Ctr);
        assert!(!store.is_initialised());
        let default = store.generator_for(None);
        assert!(Arc::ptr_eq(&default, &store.generator()));
    }
}
