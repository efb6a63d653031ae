#![forbid(unsafe_code)]

//! Pending one-shot registrations.
//!
//! # Design
//!
//! One logical registration (one `on_change` callback from one tracking call)
//! may watch properties on several registrars. Each of those registrars stores
//! its own [`Registration`] record: the local watched set plus a shared
//! [`Observer`]. The observer owns the callback and the list of every
//! `(registrar, registration id)` footprint, so whichever registrar fires can
//! silence all the others.
//!
//! # Invariants
//!
//! 1. The observer slot moves `Pending -> Fired` or `Pending -> Cancelled` and
//!    never leaves a terminal state.
//! 2. The callback is taken out of the slot under its lock before it runs, so
//!    at most one caller can ever run it.
//! 3. Once every footprint of a pending observer has been removed, the observer
//!    becomes `Cancelled` and the callback is dropped. Dropping a registrar
//!    removes every footprint it still holds.
//!
//! # Failure Modes
//!
//! - **Callback panics**: the slot is already `Fired` and sibling footprints are
//!   already removed before the callback runs; the panic propagates to the
//!   mutating caller and leaves no registration behind.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::property::PropertyId;
use crate::registrar::{RegistrarId, WeakRegistrar};

/// Boxed user callback. Runs at most once, on the mutating thread.
pub(crate) type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Unique id of one registrar-local registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    /// Allocate a fresh, process-unique registration id.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Registration({})", self.0)
    }
}

/// Lifecycle of a logical registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Waiting for the first mutation of a watched property.
    Pending,
    /// The callback ran exactly once.
    Fired,
    /// Removed without running the callback.
    Cancelled,
}

enum Slot {
    Pending(Callback),
    Fired,
    Cancelled,
}

impl Slot {
    fn state(&self) -> RegistrationState {
        match self {
            Self::Pending(_) => RegistrationState::Pending,
            Self::Fired => RegistrationState::Fired,
            Self::Cancelled => RegistrationState::Cancelled,
        }
    }
}

/// One registrar footprint of a logical registration.
#[derive(Clone)]
pub(crate) struct Member {
    pub(crate) registrar: WeakRegistrar,
    pub(crate) registration: RegistrationId,
}

/// Shared core of a logical registration.
pub(crate) struct Observer {
    slot: Mutex<Slot>,
    members: Vec<Member>,
    /// Footprints not yet removed from their registrar.
    live: AtomicUsize,
}

impl Observer {
    pub(crate) fn new(callback: Callback, members: Vec<Member>) -> Self {
        let live = AtomicUsize::new(members.len());
        Self {
            slot: Mutex::new(Slot::Pending(callback)),
            members,
            live,
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> RegistrationState {
        self.lock_slot().state()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state() == RegistrationState::Pending
    }

    /// Move `Pending -> Fired` and hand the callback to the caller.
    ///
    /// Returns `None` if the registration already fired or was cancelled.
    pub(crate) fn take_callback(&self) -> Option<Callback> {
        let mut slot = self.lock_slot();
        match mem::replace(&mut *slot, Slot::Fired) {
            Slot::Pending(callback) => Some(callback),
            previous => {
                *slot = previous;
                None
            }
        }
    }

    /// Record that one footprint was removed from its registrar.
    ///
    /// When the last footprint of a still-pending observer goes away the
    /// observer becomes `Cancelled` and the callback is dropped. Returns true
    /// in that case.
    pub(crate) fn release_footprint(&self) -> bool {
        let previous = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous != 1 {
            return false;
        }
        let dropped = {
            let mut slot = self.lock_slot();
            match mem::replace(&mut *slot, Slot::Cancelled) {
                Slot::Pending(callback) => Some(callback),
                previous => {
                    *slot = previous;
                    None
                }
            }
        };
        // The closure drops here, after the slot lock is released.
        dropped.is_some()
    }

    /// Remove every footprint except the one on `origin`.
    pub(crate) fn cancel_siblings(&self, origin: RegistrarId) {
        for member in &self.members {
            if member.registrar.id() == origin {
                continue;
            }
            // A dropped registrar released its footprints on teardown.
            if let Some(registrar) = member.registrar.upgrade() {
                registrar.cancel(member.registration);
            }
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("state", &self.state())
            .field("members", &self.members.len())
            .field("live", &self.live.load(Ordering::Acquire))
            .finish()
    }
}

/// A registrar-local record: which properties on this registrar the logical
/// registration watches.
pub(crate) struct Registration {
    pub(crate) id: RegistrationId,
    pub(crate) properties: FxHashSet<PropertyId>,
    pub(crate) observer: Arc<Observer>,
}

impl Registration {
    /// Settle this record on behalf of `origin`, which has already removed it
    /// from its index.
    ///
    /// If the logical registration was still pending, it becomes `Fired`,
    /// every sibling footprint is cancelled, and the callback is returned for
    /// the caller to run. Otherwise returns `None`.
    pub(crate) fn claim(self, origin: RegistrarId) -> Option<Callback> {
        let Some(callback) = self.observer.take_callback() else {
            self.observer.release_footprint();
            debug!(registration = self.id.raw(), "registration already settled");
            return None;
        };
        self.observer.release_footprint();
        self.observer.cancel_siblings(origin);
        Some(callback)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("properties", &self.properties.len())
            .field("observer", &self.observer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_callback() -> (Callback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let clone = Arc::clone(&count);
        (
            Box::new(move || {
                clone.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    #[test]
    fn ids_are_monotonic() {
        let a = RegistrationId::next();
        let b = RegistrationId::next();
        assert!(b > a);
        assert_eq!(RegistrationId::from_raw(a.raw()), a);
    }

    #[test]
    fn take_callback_is_exactly_once() {
        let (callback, count) = counting_callback();
        let observer = Observer::new(callback, Vec::new());
        assert!(observer.is_pending());

        let taken = observer.take_callback().expect("pending observer yields callback");
        assert_eq!(observer.state(), RegistrationState::Fired);
        assert!(observer.take_callback().is_none());

        taken();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn releasing_last_footprint_cancels() {
        let (callback, count) = counting_callback();
        let observer = Observer {
            slot: Mutex::new(Slot::Pending(callback)),
            members: Vec::new(),
            live: AtomicUsize::new(2),
        };
        assert!(!observer.release_footprint());
        assert!(observer.is_pending());
        assert!(observer.release_footprint());
        assert_eq!(observer.state(), RegistrationState::Cancelled);
        assert!(observer.take_callback().is_none());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn release_after_fire_keeps_fired() {
        let (callback, _count) = counting_callback();
        let observer = Observer {
            slot: Mutex::new(Slot::Pending(callback)),
            members: Vec::new(),
            live: AtomicUsize::new(1),
        };
        let _taken = observer.take_callback();
        assert!(!observer.release_footprint());
        assert_eq!(observer.state(), RegistrationState::Fired);
    }

    #[test]
    fn release_never_underflows() {
        let (callback, _count) = counting_callback();
        let observer = Observer::new(callback, Vec::new());
        assert!(!observer.release_footprint());
        assert!(!observer.release_footprint());
        assert!(observer.is_pending());
    }
}
