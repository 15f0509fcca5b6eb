//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;
use vizkernel::events::EventBus;
use vizkernel::graph::{Payload, TypeTag, Update};
use vizkernel::scene::NullScene;
use vizkernel::{KernelEvent, ModuleContainer};

/// Tag of the integer payloads test modules exchange
pub const NUMBER: TypeTag = TypeTag::new("number");

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

pub fn number(value: i64) -> Payload {
    Payload::tagged(NUMBER, value)
}

/// Integer carried by an update; `None` when the data became absent
pub fn value_of(update: &Update) -> Option<i64> {
    update.payload.as_ref().and_then(|p| p.get::<i64>().copied())
}

/// A container with no renderer, plus a subscription to its events
pub fn container() -> (ModuleContainer, Receiver<KernelEvent>) {
    let events = EventBus::default();
    let rx = events.subscribe();
    (ModuleContainer::new(events, Arc::new(NullScene)), rx)
}

/// Receive until `pred` matches, panicking on timeout
pub fn recv_until<T: std::fmt::Debug>(rx: &Receiver<T>, mut pred: impl FnMut(&T) -> bool) -> T {
    let deadline = std::time::Instant::now() + test_timeout();
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(item) if pred(&item) => return item,
            Ok(_) => continue,
            Err(e) => panic!("Timed out waiting for a matching message: {}", e),
        }
    }
}

/// Poll `cond` until it holds or the test timeout passes
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + test_timeout();
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
