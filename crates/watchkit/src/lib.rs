#![forbid(unsafe_code)]

//! One-shot change tracking for observable objects.
//!
//! # Role
//! `watchkit` lets a caller run a read-only probe over observable objects,
//! discovers which properties the probe read, and registers a callback that
//! fires once, the next time any of those properties is mutated.
//!
//! # Primary responsibilities
//! - **PropertyId**: identity of one property slot on one object instance.
//! - **Registrar**: per-object index of pending registrations, fed by the
//!   object's getters (`on_access`) and setters (`on_mutate`).
//! - **AccessSession**: thread-local scratch that collects reads while a probe
//!   runs.
//! - **Registration**: a pending one-shot callback whose watched set may span
//!   several registrars.
//! - **with_tracking**: the entry point tying the pieces together.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use watchkit::{ObjectId, PropertyId, PropertyKey, Registrar, with_tracking};
//!
//! const NAME: PropertyKey = PropertyKey::new("name");
//!
//! let registrar = Registrar::new();
//! let name = PropertyId::new(ObjectId::next(), NAME);
//!
//! let fired = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&fired);
//! with_tracking(
//!     || registrar.on_access(name),
//!     move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     },
//! );
//!
//! registrar.on_mutate(name);
//! registrar.on_mutate(name);
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod property;
pub mod registrar;
pub mod registration;
pub mod session;
pub mod tracking;

pub use config::ObservationConfig;
pub use diagnostics::{DiagnosticHook, ObservationEvent};
pub use error::ConfigError;
pub use property::{ObjectId, PropertyId, PropertyKey};
pub use registrar::{Registrar, RegistrarBuilder, RegistrarId};
pub use registration::{RegistrationId, RegistrationState};
pub use session::{
    AccessSession, AccessSet, RegistrationMap, is_tracking, session_depth, track_access,
};
pub use tracking::{try_with_tracking, with_tracking};
