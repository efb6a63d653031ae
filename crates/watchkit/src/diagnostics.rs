#![forbid(unsafe_code)]

//! Diagnostic side channel.
//!
//! A registrar built with a [`DiagnosticHook`] reports every access,
//! mutation, registration, fire and cancel to it. Hooks run inline on the
//! thread that produced the event and must not block.

use std::fmt;
use std::sync::Arc;

use crate::property::PropertyId;
use crate::registrar::RegistrarId;
use crate::registration::RegistrationId;

/// Callback receiving [`ObservationEvent`]s.
pub type DiagnosticHook = Arc<dyn Fn(&ObservationEvent) + Send + Sync>;

/// One observable event on a registrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationEvent {
    /// A property was read. `tracked` is true when a session recorded it.
    Access {
        registrar: RegistrarId,
        property: PropertyId,
        tracked: bool,
    },
    /// A property was mutated. `matched` counts the registrations found for it.
    Mutation {
        registrar: RegistrarId,
        property: PropertyId,
        matched: usize,
    },
    /// A registration was inserted, watching `properties` slots on this registrar.
    Registered {
        registrar: RegistrarId,
        registration: RegistrationId,
        properties: usize,
    },
    /// A registration's callback ran.
    Fired {
        registrar: RegistrarId,
        registration: RegistrationId,
    },
    /// A registration's footprint was removed without running its callback here.
    Cancelled {
        registrar: RegistrarId,
        registration: RegistrationId,
    },
}

impl ObservationEvent {
    /// Registrar that produced the event.
    #[must_use]
    pub fn registrar(&self) -> RegistrarId {
        match *self {
            Self::Access { registrar, .. }
            | Self::Mutation { registrar, .. }
            | Self::Registered { registrar, .. }
            | Self::Fired { registrar, .. }
            | Self::Cancelled { registrar, .. } => registrar,
        }
    }

    /// Property involved, for access and mutation events.
    #[must_use]
    pub fn property(&self) -> Option<PropertyId> {
        match *self {
            Self::Access { property, .. } | Self::Mutation { property, .. } => Some(property),
            _ => None,
        }
    }
}

impl fmt::Display for ObservationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access {
                property, tracked, ..
            } => {
                write!(f, "access {property}")?;
                if *tracked {
                    f.write_str(" (tracked)")?;
                }
                Ok(())
            }
            Self::Mutation {
                property, matched, ..
            } => write!(f, "mutation {property} ({matched} pending)"),
            Self::Registered {
                registration,
                properties,
                ..
            } => write!(f, "registered {registration} on {properties} properties"),
            Self::Fired { registration, .. } => write!(f, "fired {registration}"),
            Self::Cancelled { registration, .. } => write!(f, "cancelled {registration}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{ObjectId, PropertyKey};

    #[test]
    fn accessors() {
        let registrar = RegistrarId::from_raw(3);
        let property = PropertyId::new(ObjectId::from_raw(1), PropertyKey::new("name"));
        let event = ObservationEvent::Mutation {
            registrar,
            property,
            matched: 2,
        };
        assert_eq!(event.registrar(), registrar);
        assert_eq!(event.property(), Some(property));

        let fired = ObservationEvent::Fired {
            registrar,
            registration: RegistrationId::from_raw(9),
        };
        assert_eq!(fired.property(), None);
    }

    #[test]
    fn display_mirrors_log_lines() {
        let property = PropertyId::new(ObjectId::from_raw(4), PropertyKey::new("name"));
        let access = ObservationEvent::Access {
            registrar: RegistrarId::from_raw(1),
            property,
            tracked: true,
        };
        assert_eq!(access.to_string(), "access Object(4).name (tracked)");

        let mutation = ObservationEvent::Mutation {
            registrar: RegistrarId::from_raw(1),
            property,
            matched: 0,
        };
        assert_eq!(mutation.to_string(), "mutation Object(4).name (0 pending)");
    }
}
