#![forbid(unsafe_code)]

//! Per-object index of pending registrations.
//!
//! # Design
//!
//! A [`Registrar`] is a cheaply cloneable handle to shared state guarded by a
//! single mutex:
//!
//! - `lookups`: property -> ids of registrations watching it
//! - `registrations`: id -> registrar-local [`Registration`] record
//!
//! Observable objects call [`Registrar::on_access`] from every getter and
//! [`Registrar::on_mutate`] from every setter, after the new value is stored.
//!
//! # Invariants
//!
//! 1. Every id in a `lookups` bucket exists in `registrations`, and that
//!    record's watched set contains the bucket's property.
//! 2. Removing a record removes its id from every bucket; empty buckets are
//!    pruned.
//! 3. User callbacks and diagnostic hooks never run while the lock is held.
//!
//! # Failure Modes
//!
//! - **Re-entrant mutation**: a callback may mutate properties on any
//!   registrar, including the one firing. Ids are snapshotted before firing
//!   and each is removed under the lock before its callback runs, so a
//!   registration can never fire twice.
//! - **Unknown property**: accesses and mutations of properties nobody watches
//!   are ignored.
//! - **Dropped registrar**: its records are released on teardown. A
//!   registration spread over several registrars can still fire elsewhere, and
//!   is cancelled once its last surviving footprint is cancelled.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::config::ObservationConfig;
use crate::diagnostics::{DiagnosticHook, ObservationEvent};
use crate::property::PropertyId;
use crate::registration::{Member, Observer, Registration, RegistrationId};
use crate::session;

/// Unique identity of one registrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrarId(u64);

impl RegistrarId {
    fn next() -> Self {
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

impl fmt::Display for RegistrarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Registrar({})", self.0)
    }
}

#[derive(Default)]
struct RegistrarState {
    lookups: FxHashMap<PropertyId, BTreeSet<RegistrationId>>,
    registrations: FxHashMap<RegistrationId, Registration>,
}

impl RegistrarState {
    fn insert(&mut self, registration: Registration) {
        for property in &registration.properties {
            self.lookups
                .entry(*property)
                .or_default()
                .insert(registration.id);
        }
        self.registrations.insert(registration.id, registration);
    }

    /// Remove a record and unlink it from every bucket it appears in.
    fn remove(&mut self, id: RegistrationId) -> Option<Registration> {
        let registration = self.registrations.remove(&id)?;
        for property in &registration.properties {
            if let Some(bucket) = self.lookups.get_mut(property) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    self.lookups.remove(property);
                }
            }
        }
        Some(registration)
    }

    fn pending_for(&self, property: PropertyId) -> SmallVec<[RegistrationId; 4]> {
        self.lookups
            .get(&property)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    fn is_consistent(&self) -> bool {
        let indexed = self.lookups.iter().all(|(property, bucket)| {
            !bucket.is_empty()
                && bucket.iter().all(|id| {
                    self.registrations
                        .get(id)
                        .is_some_and(|r| r.properties.contains(property))
                })
        });
        let linked = self.registrations.values().all(|r| {
            r.properties.iter().all(|property| {
                self.lookups
                    .get(property)
                    .is_some_and(|bucket| bucket.contains(&r.id))
            })
        });
        indexed && linked
    }
}

impl Drop for RegistrarState {
    fn drop(&mut self) {
        for (_, registration) in self.registrations.drain() {
            registration.observer.release_footprint();
        }
    }
}

pub(crate) struct RegistrarInner {
    id: RegistrarId,
    label: Option<String>,
    config: ObservationConfig,
    diagnostics: Option<DiagnosticHook>,
    state: Mutex<RegistrarState>,
}

/// Index of pending registrations for one observable object (or a group of
/// objects sharing it).
///
/// Cloning a `Registrar` creates a new handle to the **same** index.
#[derive(Clone)]
pub struct Registrar {
    inner: Arc<RegistrarInner>,
}

/// Non-owning registrar reference held by registrations, so a registrar and
/// the registrations it stores never keep each other alive.
#[derive(Clone)]
pub(crate) struct WeakRegistrar {
    id: RegistrarId,
    inner: Weak<RegistrarInner>,
}

impl WeakRegistrar {
    pub(crate) fn id(&self) -> RegistrarId {
        self.id
    }

    pub(crate) fn upgrade(&self) -> Option<Registrar> {
        self.inner.upgrade().map(|inner| Registrar { inner })
    }
}

impl Registrar {
    /// Create a registrar with the default [`ObservationConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> RegistrarBuilder {
        RegistrarBuilder::default()
    }

    #[must_use]
    pub fn id(&self) -> RegistrarId {
        self.inner.id
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    #[must_use]
    pub fn config(&self) -> ObservationConfig {
        self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakRegistrar {
        WeakRegistrar {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistrarState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ObservationEvent) {
        if !self.inner.config.diagnostics {
            return;
        }
        if let Some(hook) = &self.inner.diagnostics {
            hook(&event);
        }
    }

    /// Report a read of `property`.
    ///
    /// Records the read into the calling thread's active tracking session, if
    /// any. Never fires callbacks.
    pub fn on_access(&self, property: PropertyId) {
        let tracked = session::track_access(self, property);
        if self.inner.config.trace_access {
            trace!(registrar = %self, property = %property, tracked, "access");
        }
        self.emit(ObservationEvent::Access {
            registrar: self.id(),
            property,
            tracked,
        });
    }

    /// Report a committed write of `property`.
    ///
    /// Every pending registration watching `property` fires exactly once and
    /// is removed from every registrar it touches. Returns the number of
    /// callbacks this call ran.
    pub fn on_mutate(&self, property: PropertyId) -> usize {
        let pending = self.lock_state().pending_for(property);
        if self.inner.config.trace_mutation {
            debug!(
                registrar = %self,
                property = %property,
                matched = pending.len(),
                "mutation"
            );
        }
        self.emit(ObservationEvent::Mutation {
            registrar: self.id(),
            property,
            matched: pending.len(),
        });

        let mut fired = 0;
        for id in pending {
            // A callback that ran earlier in this loop may have settled `id`.
            let Some(registration) = self.lock_state().remove(id) else {
                continue;
            };
            let Some(callback) = registration.claim(self.id()) else {
                continue;
            };
            debug!(registrar = %self, registration = id.raw(), "fired");
            self.emit(ObservationEvent::Fired {
                registrar: self.id(),
                registration: id,
            });
            callback();
            fired += 1;
        }
        fired
    }

    /// Run `mutation`, then report a write of `property`.
    ///
    /// Observers therefore see the new value.
    pub fn with_mutation<R>(&self, property: PropertyId, mutation: impl FnOnce() -> R) -> R {
        let result = mutation();
        self.on_mutate(property);
        result
    }

    /// Remove one registration's footprint from this registrar.
    ///
    /// Idempotent: returns false if `id` is not pending here. When this was
    /// the last footprint of a pending registration, the registration becomes
    /// cancelled and its callback is dropped without running.
    pub fn cancel(&self, id: RegistrationId) -> bool {
        let Some(registration) = self.lock_state().remove(id) else {
            return false;
        };
        let settled = registration.observer.release_footprint();
        debug!(
            registrar = %self,
            registration = id.raw(),
            settled,
            "cancelled"
        );
        self.emit(ObservationEvent::Cancelled {
            registrar: self.id(),
            registration: id,
        });
        true
    }

    /// Register a one-shot callback on properties of this registrar only.
    ///
    /// The callback fires on the first mutation of any property in
    /// `properties`. Returns `None` for an empty watch set, in which case
    /// nothing is registered and the callback is dropped.
    pub fn register_on_change(
        &self,
        properties: impl IntoIterator<Item = PropertyId>,
        callback: impl FnOnce() + Send + 'static,
    ) -> Option<RegistrationId> {
        let properties: FxHashSet<PropertyId> = properties.into_iter().collect();
        if properties.is_empty() {
            debug!(registrar = %self, "empty watch set; nothing registered");
            return None;
        }
        let id = RegistrationId::next();
        let observer = Arc::new(Observer::new(
            Box::new(callback),
            vec![Member {
                registrar: self.downgrade(),
                registration: id,
            }],
        ));
        self.insert_registration(id, properties, &observer);
        Some(id)
    }

    /// Insert a record for `observer` unless it already left `Pending`.
    pub(crate) fn insert_registration(
        &self,
        id: RegistrationId,
        properties: FxHashSet<PropertyId>,
        observer: &Arc<Observer>,
    ) -> bool {
        let count = properties.len();
        let inserted = {
            let mut state = self.lock_state();
            // Checked under our lock: a concurrent fire that already claimed the
            // observer has either removed this id or will find it here.
            if observer.is_pending() {
                state.insert(Registration {
                    id,
                    properties,
                    observer: Arc::clone(observer),
                });
                true
            } else {
                false
            }
        };
        if !inserted {
            observer.release_footprint();
            debug!(registrar = %self, registration = id.raw(), "observer settled before insert");
            return false;
        }
        debug!(
            registrar = %self,
            registration = id.raw(),
            properties = count,
            "registered"
        );
        self.emit(ObservationEvent::Registered {
            registrar: self.id(),
            registration: id,
            properties: count,
        });
        true
    }

    /// Number of registrations pending on this registrar.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_state().registrations.len()
    }

    /// Whether `id` is pending on this registrar.
    #[must_use]
    pub fn contains(&self, id: RegistrationId) -> bool {
        self.lock_state().registrations.contains_key(&id)
    }

    /// Number of pending registrations watching `property`.
    #[must_use]
    pub fn watcher_count(&self, property: PropertyId) -> usize {
        self.lock_state()
            .lookups
            .get(&property)
            .map_or(0, BTreeSet::len)
    }

    /// Check that `lookups` and `registrations` agree.
    ///
    /// Intended for tests and debug assertions; takes the lock and walks the
    /// whole index.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.lock_state().is_consistent()
    }
}

impl Default for Registrar {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Registrar {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Registrar {}

impl std::hash::Hash for Registrar {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Display for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.label {
            Some(label) => write!(f, "{label}#{}", self.inner.id.0),
            None => write!(f, "{}", self.inner.id),
        }
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Registrar")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("pending", &state.registrations.len())
            .field("watched_properties", &state.lookups.len())
            .finish()
    }
}

/// Builder for [`Registrar`].
#[derive(Default)]
pub struct RegistrarBuilder {
    label: Option<String>,
    config: ObservationConfig,
    diagnostics: Option<DiagnosticHook>,
}

impl RegistrarBuilder {
    /// Name shown in log fields, e.g. the observable type.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ObservationConfig) -> Self {
        self.config = config;
        self
    }

    /// Install a diagnostic hook receiving every [`ObservationEvent`].
    #[must_use]
    pub fn with_diagnostics(
        mut self,
        hook: impl Fn(&ObservationEvent) + Send + Sync + 'static,
    ) -> Self {
        self.diagnostics = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> Registrar {
        Registrar {
            inner: Arc::new(RegistrarInner {
                id: RegistrarId::next(),
                label: self.label,
                config: self.config,
                diagnostics: self.diagnostics,
                state: Mutex::new(RegistrarState::default()),
            }),
        }
    }
}

impl fmt::Debug for RegistrarBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrarBuilder")
            .field("label", &self.label)
            .field("config", &self.config)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
