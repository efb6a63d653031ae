#![forbid(unsafe_code)]

//! `Suspect`: a hand-written observable object.
//!
//! Getters report the read to the object's [`Registrar`] before returning the
//! value. Setters commit the new value and then notify, through
//! [`Registrar::with_mutation`].

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::info;
use watchkit::{ObjectId, ObservationConfig, PropertyId, PropertyKey, Registrar};

/// A person of interest with two observable properties.
pub struct Suspect {
    object: ObjectId,
    registrar: Registrar,
    name: Mutex<String>,
    suspiciousness: AtomicI64,
}

impl Suspect {
    pub const NAME: PropertyKey = PropertyKey::new("name");
    pub const SUSPICIOUSNESS: PropertyKey = PropertyKey::new("suspiciousness");

    #[must_use]
    pub fn new(name: impl Into<String>, suspiciousness: i64) -> Self {
        Self::with_config(name, suspiciousness, ObservationConfig::default())
    }

    /// Build a suspect whose registrar uses `config` and logs every
    /// observation event at `info` level.
    #[must_use]
    pub fn with_config(
        name: impl Into<String>,
        suspiciousness: i64,
        config: ObservationConfig,
    ) -> Self {
        let registrar = Registrar::builder()
            .with_label("Suspect")
            .with_config(config)
            .with_diagnostics(|event| info!(%event, "observation"))
            .build();
        Self::with_registrar(name, suspiciousness, registrar)
    }

    /// Build a suspect on a caller-supplied registrar, e.g. one carrying a
    /// diagnostic hook.
    #[must_use]
    pub fn with_registrar(
        name: impl Into<String>,
        suspiciousness: i64,
        registrar: Registrar,
    ) -> Self {
        Self {
            object: ObjectId::next(),
            registrar,
            name: Mutex::new(name.into()),
            suspiciousness: AtomicI64::new(suspiciousness),
        }
    }

    #[must_use]
    pub fn object(&self) -> ObjectId {
        self.object
    }

    #[must_use]
    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    #[must_use]
    pub fn name_property(&self) -> PropertyId {
        PropertyId::new(self.object, Self::NAME)
    }

    #[must_use]
    pub fn suspiciousness_property(&self) -> PropertyId {
        PropertyId::new(self.object, Self::SUSPICIOUSNESS)
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.registrar.on_access(self.name_property());
        self.name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.registrar.with_mutation(self.name_property(), || {
            *self.name.lock().unwrap_or_else(PoisonError::into_inner) = name;
        });
    }

    #[must_use]
    pub fn suspiciousness(&self) -> i64 {
        self.registrar.on_access(self.suspiciousness_property());
        self.suspiciousness.load(Ordering::SeqCst)
    }

    pub fn set_suspiciousness(&self, value: i64) {
        self.registrar
            .with_mutation(self.suspiciousness_property(), || {
                self.suspiciousness.store(value, Ordering::SeqCst);
            });
    }
}

impl fmt::Debug for Suspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Untracked peek at the fields.
        f.debug_struct("Suspect")
            .field("object", &self.object)
            .field(
                "name",
                &*self.name.lock().unwrap_or_else(PoisonError::into_inner),
            )
            .field("suspiciousness", &self.suspiciousness.load(Ordering::SeqCst))
            .finish()
    }
}
