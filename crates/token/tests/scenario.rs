//! End-to-end issue / verify / expire / rotate flow through the public API.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, UNIX_EPOCH};

use token::{
    Binding, CipherKind, Clock, DefaultStore, Format, ScalarKind, Settings, Token, TokenError,
    TokenGenerator, Value,
};

/// Clock the test can advance by hand.
#[derive(Default)]
struct ManualClock(AtomicU64);

impl ManualClock {
    fn starting_at(secs: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(secs)))
    }

    fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    fn secs_from_now(&self, secs: u64) -> std::time::SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.now() + secs)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn addr(s: &str) -> Option<Binding> {
    Some(s.parse().unwrap())
}

#[test]
fn issue_verify_expire() {
    let clock = ManualClock::starting_at(1_700_000_000);
    let generator = TokenGenerator::new(Settings::random(CipherKind::Aes256Ctr, Format::default()))
        .with_clock(clock.clone());

    let token = generator
        .generate(&Value::Unsigned(0), addr("0.0.0.0"), clock.secs_from_now(1))
        .unwrap();

    assert_eq!(generator.verify(&token, addr("0.0.0.0")).unwrap(), Value::Unsigned(0));
    assert!(matches!(
        generator.verify(&token, addr("0.0.0.1")),
        Err(TokenError::Invalid)
    ));

    clock.advance(2);
    assert!(matches!(
        generator.verify(&token, addr("0.0.0.0")),
        Err(TokenError::Invalid)
    ));
    assert!(matches!(
        generator.verify(&token, addr("0.0.0.1")),
        Err(TokenError::Invalid)
    ));
}

#[test]
fn rotation_keeps_session_alive() {
    let clock = ManualClock::starting_at(1_700_000_000);
    let format = Format::Sequence(vec![Format::Scalar(ScalarKind::U32), Format::VarString]);
    let generator = TokenGenerator::new(Settings::random(CipherKind::Aes256GcmSiv, format))
        .with_clock(clock.clone());
    let payload = Value::Sequence(vec![Value::Unsigned(17), Value::from("alice")]);

    let mut token = generator
        .generate(&payload, addr("192.168.1.20"), clock.secs_from_now(10))
        .unwrap();

    // Each request within the window trades the token for a fresh one.
    for _ in 0..5 {
        clock.advance(8);
        let (value, next) = generator
            .verify_and_extend(&token, addr("192.168.1.20"), clock.secs_from_now(10))
            .unwrap();
        assert_eq!(value, payload);
        token = next;
    }

    clock.advance(11);
    assert!(generator.verify(&token, addr("192.168.1.20")).is_err());
}

#[test]
fn text_encoded_token_survives_transport() {
    let clock = ManualClock::starting_at(1_700_000_000);
    let store = DefaultStore::with_clock(clock.clone());
    let token = store
        .generate(&Value::Unsigned(4242), addr("10.0.0.7"), clock.secs_from_now(60))
        .unwrap();

    let header_value = token.to_base64();
    let received = Token::from_base64(&header_value).unwrap();
    assert_eq!(store.verify(&received, addr("10.0.0.7")).unwrap(), Value::Unsigned(4242));
}

#[test]
fn generators_do_not_share_keys() {
    let clock = ManualClock::starting_at(1_700_000_000);
    let a = TokenGenerator::new(Settings::default()).with_clock(clock.clone());
    let b = TokenGenerator::new(Settings::default()).with_clock(clock.clone());

    let token = a
        .generate(&Value::Unsigned(1), addr("0.0.0.0"), clock.secs_from_now(60))
        .unwrap();
    assert!(b.verify(&token, addr("0.0.0.0")).is_err());
}

#[test]
fn generator_and_store_are_thread_safe() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<TokenGenerator>();
    assert_send_sync::<DefaultStore>();
    assert_send_sync::<Token>();
}

#[test]
fn concurrent_generate_and_verify() {
    let clock = ManualClock::starting_at(1_700_000_000);
    let format = Format::Sequence(vec![Format::Scalar(ScalarKind::U32), Format::VarString]);
    let generator = Arc::new(
        TokenGenerator::new(Settings::random(CipherKind::Aes256Ctr, format))
            .with_clock(clock.clone()),
    );

    std::thread::scope(|scope| {
        for worker in 0..8u32 {
            let generator = Arc::clone(&generator);
            let clock = &clock;
            scope.spawn(move || {
                let peer = addr(&format!("10.0.0.{worker}"));
                for round in 0..50u32 {
                    let payload = Value::Sequence(vec![
                        Value::from(worker * 1_000 + round),
                        Value::from(format!("worker-{worker}")),
                    ]);
                    let token = generator
                        .generate(&payload, peer, clock.secs_from_now(60))
                        .unwrap();
                    assert_eq!(generator.verify(&token, peer).unwrap(), payload);
                }
            });
        }
    });
}
