use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_test::traced_test;

use crate::model::ClientIdGenerator;
use crate::test_utils::features_payload;
use crate::test_utils::test_key;
use crate::ConfigKey;
use crate::Payload;
use crate::SubscriberRegistry;
use crate::UpdateCallback;

fn counting_callback(counter: &Arc<AtomicUsize>) -> UpdateCallback {
    let counter = counter.clone();
    Arc::new(move |_: Arc<Payload>| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn notify_reaches_only_clients_bound_to_the_key() {
    let registry = SubscriberRegistry::new();
    let ids = ClientIdGenerator::default();
    let key = test_key();
    let other = ConfigKey::new("https://api.example.com", "other");
    let hits = Arc::new(AtomicUsize::new(0));
    let misses = Arc::new(AtomicUsize::new(0));

    registry.register(ids.next_id(), &key, counting_callback(&hits));
    registry.register(ids.next_id(), &key, counting_callback(&hits));
    registry.register(ids.next_id(), &other, counting_callback(&misses));

    assert_eq!(registry.notify_all(&key, &features_payload("flag1", "true")), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(misses.load(Ordering::SeqCst), 0);
}

#[test]
fn callback_receives_the_notified_payload() {
    let registry = SubscriberRegistry::new();
    let client = ClientIdGenerator::default().next_id();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    registry.register(
        client,
        &test_key(),
        Arc::new(move |payload: Arc<Payload>| {
            *sink.lock() = Some(payload);
        }),
    );

    let payload = features_payload("flag1", "42");
    registry.notify_all(&test_key(), &payload);

    assert!(Arc::ptr_eq(seen.lock().as_ref().unwrap(), &payload));
}

#[test]
fn register_replaces_previous_binding() {
    let registry = SubscriberRegistry::new();
    let client = ClientIdGenerator::default().next_id();
    let first = ConfigKey::new("https://api.example.com", "first");
    let second = ConfigKey::new("https://api.example.com", "second");
    let old = Arc::new(AtomicUsize::new(0));
    let new = Arc::new(AtomicUsize::new(0));

    assert_eq!(registry.register(client, &first, counting_callback(&old)), None);
    assert_eq!(registry.register(client, &second, counting_callback(&new)), Some(first.clone()));

    registry.notify_all(&first, &features_payload("flag1", "1"));
    registry.notify_all(&second, &features_payload("flag1", "1"));
    assert_eq!(old.load(Ordering::SeqCst), 0);
    assert_eq!(new.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.bound_key(client), Some(second));
}

#[test]
fn unregister_is_idempotent_and_isolates_others() {
    let registry = SubscriberRegistry::new();
    let ids = ClientIdGenerator::default();
    let (a, b) = (ids.next_id(), ids.next_id());
    let key = test_key();
    let a_hits = Arc::new(AtomicUsize::new(0));
    let b_hits = Arc::new(AtomicUsize::new(0));
    registry.register(a, &key, counting_callback(&a_hits));
    registry.register(b, &key, counting_callback(&b_hits));

    assert_eq!(registry.unregister(a), Some(key.clone()));
    assert_eq!(registry.unregister(a), None);

    registry.notify_all(&key, &features_payload("flag1", "true"));
    assert_eq!(a_hits.load(Ordering::SeqCst), 0);
    assert_eq!(b_hits.load(Ordering::SeqCst), 1);
    assert_eq!(registry.count_for(&key), 1);
}

#[test]
#[traced_test]
fn panicking_callback_does_not_block_others() {
    let registry = SubscriberRegistry::new();
    let ids = ClientIdGenerator::default();
    let key = test_key();
    let hits = Arc::new(AtomicUsize::new(0));

    registry.register(ids.next_id(), &key, Arc::new(|_: Arc<Payload>| panic!("consumer bug")));
    registry.register(ids.next_id(), &key, counting_callback(&hits));

    assert_eq!(registry.notify_all(&key, &features_payload("flag1", "true")), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(logs_contain("update callback panicked"));
}

#[test]
fn callback_may_unregister_itself_during_fan_out() {
    let registry = Arc::new(SubscriberRegistry::new());
    let client = ClientIdGenerator::default().next_id();
    let key = test_key();

    let inner = registry.clone();
    registry.register(
        client,
        &key,
        Arc::new(move |_: Arc<Payload>| {
            inner.unregister(client);
        }),
    );

    assert_eq!(registry.notify_all(&key, &features_payload("flag1", "true")), 1);
    assert!(registry.is_empty());
}
