//! Behavioral properties of tracked registrations across registrars.
//!
//! 1. Exactly-once: a registration watching N properties on M registrars fires
//!    once, on whichever watched property mutates first.
//! 2. Cross-registrar cancellation: firing on one registrar removes the
//!    registration from every other registrar it touched.
//! 3. No accidental fan-in: independent tracking calls stay independent.
//! 4. Repeated reads inside one probe collapse to one watched entry.
//! 5. A failing probe registers nothing.
//! 6. Dropping a registrar removes its footprints: the registration still
//!    fires elsewhere, and is cancelled once no footprint is left.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use watchkit::{
    AccessSession, ObjectId, PropertyId, PropertyKey, Registrar, RegistrationState,
    try_with_tracking, with_tracking,
};

const X: PropertyKey = PropertyKey::new("x");
const Y: PropertyKey = PropertyKey::new("y");
const Z: PropertyKey = PropertyKey::new("z");

/// A minimal observable object: one registrar plus an object id.
struct Node {
    object: ObjectId,
    registrar: Registrar,
}

impl Node {
    fn new() -> Self {
        Self {
            object: ObjectId::next(),
            registrar: Registrar::new(),
        }
    }

    fn prop(&self, key: PropertyKey) -> PropertyId {
        PropertyId::new(self.object, key)
    }

    fn read(&self, key: PropertyKey) {
        self.registrar.on_access(self.prop(key));
    }

    fn write(&self, key: PropertyKey) -> usize {
        self.registrar.on_mutate(self.prop(key))
    }
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
    let count = Arc::new(AtomicUsize::new(0));
    let shared = Arc::clone(&count);
    (count, move || {
        let c = Arc::clone(&shared);
        Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }) as Box<dyn FnOnce() + Send>
    })
}

#[test]
fn exactly_once_across_every_trigger() {
    let keys = [X, Y, Z];
    // For each (node, key) choice of first trigger, the other 8 writes must be silent.
    for trigger_node in 0..3 {
        for trigger_key in keys {
            let nodes: Vec<Node> = (0..3).map(|_| Node::new()).collect();
            let (count, make) = counter();

            with_tracking(
                || {
                    for node in &nodes {
                        for key in keys {
                            node.read(key);
                        }
                    }
                },
                make(),
            );

            assert_eq!(nodes[trigger_node].write(trigger_key), 1);
            for node in &nodes {
                for key in keys {
                    assert_eq!(node.write(key), 0);
                }
            }
            assert_eq!(count.load(Ordering::SeqCst), 1);
            for node in &nodes {
                assert_eq!(node.registrar.pending_count(), 0);
                assert!(node.registrar.is_consistent());
            }
        }
    }
}

#[test]
fn cross_registrar_cancellation() {
    let a = Node::new();
    let b = Node::new();
    let (count, make) = counter();

    let session = AccessSession::begin();
    a.read(X);
    b.read(Y);
    let map = session.finish().finalize(make());
    let on_b = map.get(b.registrar.id()).expect("b was read");
    assert!(b.registrar.contains(on_b));

    assert_eq!(a.write(X), 1);
    assert!(!b.registrar.contains(on_b));
    assert_eq!(b.registrar.watcher_count(b.prop(Y)), 0);
    assert_eq!(b.write(Y), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(map.state(), Some(RegistrationState::Fired));
}

#[test]
fn independent_trackings_do_not_fan_in() {
    let a = Node::new();
    let b = Node::new();
    let (first, make_first) = counter();
    let (second, make_second) = counter();

    with_tracking(
        || {
            a.read(X);
            b.read(Y);
        },
        make_first(),
    );
    with_tracking(
        || {
            a.read(X);
            b.read(Z);
        },
        make_second(),
    );
    assert_eq!(a.registrar.watcher_count(a.prop(X)), 2);

    assert_eq!(b.write(Y), 1);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
    assert_eq!(a.registrar.watcher_count(a.prop(X)), 1);

    assert_eq!(a.write(X), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(b.write(Z), 0);
}

#[test]
fn repeated_reads_collapse() {
    let a = Node::new();
    let session = AccessSession::begin();
    a.read(X);
    a.read(X);
    a.read(X);
    let accessed = session.finish();
    assert_eq!(accessed.len(), 1);

    let (count, make) = counter();
    accessed.finalize(make());
    assert_eq!(a.registrar.watcher_count(a.prop(X)), 1);
    assert_eq!(a.registrar.pending_count(), 1);
    assert_eq!(a.write(X), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_probe_never_notifies() {
    let a = Node::new();
    let (count, make) = counter();

    let result: Result<(), String> = try_with_tracking(
        || {
            a.read(X);
            Err("lookup failed".to_string())
        },
        make(),
    );
    assert_eq!(result.unwrap_err(), "lookup failed");
    assert_eq!(a.write(X), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn shared_registrar_across_objects() {
    let shared = Registrar::new();
    let first = ObjectId::next();
    let second = ObjectId::next();
    let (count, make) = counter();

    with_tracking(|| shared.on_access(PropertyId::new(first, X)), make());

    assert_eq!(shared.on_mutate(PropertyId::new(second, X)), 0);
    assert_eq!(shared.on_mutate(PropertyId::new(first, X)), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn callback_mutating_sibling_registrar_does_not_refire() {
    let a = Arc::new(Node::new());
    let b = Arc::new(Node::new());
    let (count, make) = counter();
    let inner = make();
    let sibling = Arc::clone(&b);

    with_tracking(
        || {
            a.read(X);
            b.read(Y);
        },
        move || {
            inner();
            sibling.write(Y);
        },
    );

    assert_eq!(a.write(X), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(b.registrar.pending_count(), 0);
}

#[test]
fn dropped_registrar_does_not_block_firing() {
    let a = Node::new();
    let b = Node::new();
    let (count, make) = counter();

    with_tracking(
        || {
            a.read(X);
            b.read(Y);
        },
        make(),
    );
    drop(b);

    assert_eq!(a.write(X), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn cancelling_survivor_of_dropped_registrar_cancels_registration() {
    let a = Node::new();
    let b = Node::new();
    let witness = Arc::new(());
    let held = Arc::clone(&witness);

    let session = AccessSession::begin();
    a.read(X);
    b.read(Y);
    let map = session.finish().finalize(move || drop(held));
    drop(b);
    assert_eq!(map.state(), Some(RegistrationState::Pending));

    let on_a = map.get(a.registrar.id()).expect("a was read");
    assert!(a.registrar.cancel(on_a));
    assert_eq!(map.state(), Some(RegistrationState::Cancelled));
    assert_eq!(Arc::strong_count(&witness), 1);
    assert_eq!(a.write(X), 0);
}

#[test]
fn dropping_every_registrar_cancels_registration() {
    let a = Node::new();
    let b = Node::new();
    let (count, make) = counter();

    let session = AccessSession::begin();
    a.read(X);
    b.read(Y);
    let map = session.finish().finalize(make());
    drop(a);
    drop(b);

    assert_eq!(map.state(), Some(RegistrationState::Cancelled));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}
