#![forbid(unsafe_code)]

//! Property identity.
//!
//! A [`PropertyId`] names "property P on object O". It is the pair of an
//! [`ObjectId`], allocated once per observable instance from a process-wide
//! counter, and a [`PropertyKey`], a static tag declared once per property of
//! the observable type.
//!
//! # Invariants
//!
//! 1. Two reads or writes of the same property on the same instance produce
//!    equal `PropertyId`s.
//! 2. Different instances, or different properties on one instance, never
//!    compare equal.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity token of one observable object instance.
///
/// Allocate one per instance with [`ObjectId::next`] and keep it for the
/// lifetime of the object. Ids are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate a fresh, process-unique object id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Create an object id from a raw value.
    ///
    /// Use this only when ids are managed externally; raw ids bypass the
    /// uniqueness guarantee of [`ObjectId::next`].
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.0)
    }
}

/// Static tag naming one declared property of an observable type.
///
/// Declare these as constants next to the type:
///
/// ```
/// use watchkit::PropertyKey;
///
/// const NAME: PropertyKey = PropertyKey::new("name");
/// const SUSPICIOUSNESS: PropertyKey = PropertyKey::new("suspiciousness");
/// assert_ne!(NAME, SUSPICIOUSNESS);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey(&'static str);

impl PropertyKey {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// One property slot of one observable instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId {
    object: ObjectId,
    key: PropertyKey,
}

impl PropertyId {
    #[must_use]
    pub const fn new(object: ObjectId, key: PropertyKey) -> Self {
        Self { object, key }
    }

    #[must_use]
    pub const fn object(self) -> ObjectId {
        self.object
    }

    #[must_use]
    pub const fn key(self) -> PropertyKey {
        self.key
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.key)
    }
}
