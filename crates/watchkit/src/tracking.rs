#![forbid(unsafe_code)]

//! Tracking entry points.
//!
//! [`with_tracking`] runs a probe inside a fresh [`AccessSession`], then turns
//! every property the probe read into a one-shot registration bound to
//! `on_change`.
//!
//! # Invariants
//!
//! 1. Registrations are created only after the probe returns, so mutations
//!    made by the probe itself never fire its own `on_change`.
//! 2. The session is closed before registrations are created, whatever the
//!    probe's outcome.
//! 3. If the probe fails (returns `Err` or panics), nothing is registered and
//!    `on_change` is dropped without running.
//!
//! # Concurrency
//!
//! The probe runs synchronously on the calling thread. Sessions are
//! thread-local, so concurrent tracking calls on different threads never see
//! each other's reads. The probe must not hand work off to another thread and
//! expect those reads to be tracked.

use tracing::{debug, debug_span};

use crate::session::AccessSession;

/// Run `probe`, and call `on_change` once, the first time any property it
/// read is mutated afterward.
///
/// Returns the probe's result. Calling `with_tracking` from inside a probe
/// opens a nested session that shadows the outer one until it returns.
///
/// # Example
///
/// ```
/// use watchkit::{ObjectId, PropertyId, PropertyKey, Registrar, with_tracking};
///
/// let registrar = Registrar::new();
/// let score = PropertyId::new(ObjectId::next(), PropertyKey::new("score"));
///
/// let value = with_tracking(
///     || {
///         registrar.on_access(score);
///         42
///     },
///     || println!("score changed"),
/// );
/// assert_eq!(value, 42);
/// assert_eq!(registrar.watcher_count(score), 1);
/// ```
pub fn with_tracking<T>(
    probe: impl FnOnce() -> T,
    on_change: impl FnOnce() + Send + 'static,
) -> T {
    let session = AccessSession::begin();
    let span = debug_span!("with_tracking", depth = session.depth()).entered();
    let result = probe();
    let accessed = session.finish();
    let reads = accessed.len();
    let registrations = accessed.finalize(on_change);
    debug!(reads, registrars = registrations.len(), "tracking finalized");
    drop(span);
    result
}

/// Fallible form of [`with_tracking`].
///
/// An `Err` from `probe` is returned unchanged, the recorded reads are
/// discarded, and `on_change` is never registered.
pub fn try_with_tracking<T, E>(
    probe: impl FnOnce() -> Result<T, E>,
    on_change: impl FnOnce() + Send + 'static,
) -> Result<T, E> {
    let session = AccessSession::begin();
    let span = debug_span!("try_with_tracking", depth = session.depth()).entered();
    match probe() {
        Ok(value) => {
            let accessed = session.finish();
            let reads = accessed.len();
            let registrations = accessed.finalize(on_change);
            debug!(reads, registrars = registrations.len(), "tracking finalized");
            drop(span);
            Ok(value)
        }
        Err(err) => {
            drop(session);
            debug!("probe failed; reads discarded");
            drop(span);
            Err(err)
        }
    }
}
