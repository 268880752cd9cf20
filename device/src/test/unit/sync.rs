use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::{Event, WaitList};

#[test]
fn test_complete_then_wait_reaps() {
    let events = WaitList::new();
    let event = events.new_event();
    assert!(!events.get_completed(event));

    events.set_completed(event, true);
    assert!(events.get_completed(event));

    events.wait(event);
    assert!(events.is_empty());
    assert!(!events.get_completed(event), "reaped handle reads as unknown");
}

#[test]
fn test_wait_reaps_children() {
    let events = Arc::new(WaitList::new());
    let parent = events.new_event();
    let first = events.new_child_event(parent);
    let second = events.new_child_event(parent);
    assert_eq!(events.len(), 3);

    let producer = {
        let events = Arc::clone(&events);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            events.set_completed(second, true);
            events.set_completed(first, true);
            events.set_completed(parent, true);
        })
    };

    events.wait(parent);
    producer.join().unwrap();
    assert!(events.is_empty());
}

#[test]
fn test_wait_unknown_returns() {
    let events = WaitList::new();
    let event = events.new_event();
    events.remove(event);
    events.wait(event);
    events.set_completed(event, true);
    assert!(!events.get_completed(event));
}

#[test]
fn test_stale_handle_after_reuse() {
    let events = WaitList::new();
    let old = events.new_event();
    events.remove(old);

    let new = events.new_event();
    assert_eq!(new.index(), old.index(), "slot is reused");
    assert_ne!(new.generation(), old.generation());

    events.set_completed(new, true);
    assert!(!events.get_completed(old));
    assert!(events.get_completed(new));
}

#[test]
fn test_remove_cascades_to_children() {
    let events = WaitList::new();
    let parent = events.new_event();
    let child = events.new_child_event(parent);
    let grandchild = events.new_child_event(child);
    let unrelated = events.new_event();

    events.remove(parent);
    assert_eq!(events.len(), 1);
    events.set_completed(grandchild, true);
    assert!(!events.get_completed(grandchild));

    events.set_completed(unrelated, true);
    assert!(events.get_completed(unrelated));
}

#[test]
fn test_event_bits_round_trip() {
    let events = WaitList::new();
    let stale = events.new_event();
    events.remove(stale);
    let event = events.new_event();
    assert_eq!(event.generation(), 1);

    let restored = Event::from_bits(event.to_bits());
    assert_eq!(restored, event);
    assert_ne!(event.to_bits(), stale.to_bits());

    events.set_completed(event, true);
    assert!(events.get_completed(restored));
}

#[test]
#[should_panic(expected = "unknown parent event")]
fn test_child_of_unknown_parent_is_fatal() {
    let events = WaitList::new();
    let parent = events.new_event();
    events.remove(parent);
    events.new_child_event(parent);
}

#[test]
fn test_wait_blocks_until_completed() {
    let events = Arc::new(WaitList::new());
    let event = events.new_event();

    let waiter = {
        let events = Arc::clone(&events);
        thread::spawn(move || events.wait(event))
    };

    thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished());

    events.set_completed(event, true);
    waiter.join().unwrap();
    assert!(events.is_empty());
}
