//! Chord timing behavior of the sequence dispatcher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio::time::Instant;

use crmsync_core::{KeyEvent, SequenceDispatcher, Shortcut};

fn dispatcher_with_chord(window_ms: u64) -> (SequenceDispatcher, Arc<AtomicUsize>) {
    let dispatcher = SequenceDispatcher::new(Duration::from_millis(window_ms));
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    dispatcher.register(Shortcut::chord('g', 'd'), "go to dashboard", move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (dispatcher, fired)
}

#[test]
fn chord_within_window_fires_once() {
    let (dispatcher, fired) = dispatcher_with_chord(1000);
    let start = Instant::now();

    assert!(!dispatcher.handle_key_event(&KeyEvent::new("g").at(start)).is_handled());
    assert!(dispatcher
        .handle_key_event(&KeyEvent::new("d").at(start + Duration::from_millis(400)))
        .is_handled());
    // The chord was consumed; a second "d" does not re-fire it.
    assert!(!dispatcher
        .handle_key_event(&KeyEvent::new("d").at(start + Duration::from_millis(500)))
        .is_handled());

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn chord_after_window_does_not_fire() {
    let (dispatcher, fired) = dispatcher_with_chord(1000);
    let start = Instant::now();

    dispatcher.handle_key_event(&KeyEvent::new("g").at(start));
    dispatcher.handle_key_event(&KeyEvent::new("d").at(start + Duration::from_millis(1500)));

    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn keys_typed_in_inputs_never_arm_a_chord() {
    let (dispatcher, fired) = dispatcher_with_chord(1000);
    let start = Instant::now();

    dispatcher.handle_key_event(&KeyEvent::new("g").in_text_input().at(start));
    dispatcher.handle_key_event(&KeyEvent::new("d").at(start + Duration::from_millis(100)));
    dispatcher.handle_key_event(&KeyEvent::new("g").at(start + Duration::from_millis(200)));
    dispatcher.handle_key_event(&KeyEvent::new("d").in_text_input().at(start + Duration::from_millis(300)));

    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn an_unmatched_key_becomes_the_new_chord_start() {
    let (dispatcher, fired) = dispatcher_with_chord(1000);
    let start = Instant::now();

    dispatcher.handle_key_event(&KeyEvent::new("x").at(start));
    dispatcher.handle_key_event(&KeyEvent::new("g").at(start + Duration::from_millis(100)));
    dispatcher.handle_key_event(&KeyEvent::new("d").at(start + Duration::from_millis(200)));

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

proptest! {
    #[test]
    fn chord_fires_iff_gap_within_window(gap_ms in 0u64..3000, window_ms in 100u64..2000) {
        let (dispatcher, fired) = dispatcher_with_chord(window_ms);
        let start = Instant::now();

        dispatcher.handle_key_event(&KeyEvent::new("g").at(start));
        dispatcher.handle_key_event(&KeyEvent::new("d").at(start + Duration::from_millis(gap_ms)));

        let expected = if gap_ms <= window_ms { 1 } else { 0 };
        prop_assert_eq!(fired.load(Ordering::SeqCst), expected);
    }
}
