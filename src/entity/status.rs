//! Enumerated lifecycle and status fields.
//!
//! Each enumeration has a documented default that applies when the field is
//! absent or blank. Values outside the recognized set are preserved verbatim
//! in [`Unrecognized`](LifecycleStage::Unrecognized) so a snapshot written by
//! a newer or older schema loads without silently losing data; such values
//! are rejected on every write and dropped by snapshot migration.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical spelling used for matching: trimmed, lowercase, `_` separators.
fn canonical(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// A value outside the recognized set, kept as read.
            Unrecognized(String),
        }

        impl $name {
            /// The recognized values, default first.
            pub const LABELS: &'static [&'static str] = &[$($label),+];

            /// Parses a value, tolerating case, padding and `-`/space separators.
            ///
            /// Returns `None` for values outside the recognized set. Blank input
            /// parses as the default.
            #[must_use]
            pub fn parse(raw: &str) -> Option<Self> {
                let canonical = canonical(raw);
                if canonical.is_empty() {
                    return Some(Self::default());
                }
                match canonical.as_str() {
                    $($label => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Parses a value, keeping unknown input as [`Self::Unrecognized`].
            #[must_use]
            pub fn parse_lossless(raw: &str) -> Self {
                Self::parse(raw).unwrap_or_else(|| Self::Unrecognized(raw.to_string()))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $label,)+
                    Self::Unrecognized(raw) => raw,
                }
            }

            #[must_use]
            pub const fn is_recognized(&self) -> bool {
                !matches!(self, Self::Unrecognized(_))
            }

            /// Re-parses an unrecognized value; recognized values are returned as-is.
            #[must_use]
            pub fn normalized(&self) -> Option<Self> {
                match self {
                    Self::Unrecognized(raw) => Self::parse(raw),
                    other => Some(other.clone()),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = Option::<String>::deserialize(deserializer)?;
                Ok(raw.map_or_else(Self::default, |raw| Self::parse_lossless(&raw)))
            }
        }
    };
}

status_enum! {
    /// Developmental stage of an organism.
    LifecycleStage, default = Planned {
        Planned => "planned",
        EmbryoLarva => "embryo_larva",
        Juvenile => "juvenile",
        Adult => "adult",
        Retired => "retired",
        Deceased => "deceased",
    }
}

status_enum! {
    /// Operational state of a housing unit.
    HousingState, default = Active {
        Active => "active",
        Quarantine => "quarantine",
        Cleaning => "cleaning",
        Decommissioned => "decommissioned",
    }
}

status_enum! {
    /// Environment a housing unit provides.
    HousingEnvironment, default = Terrestrial {
        Terrestrial => "terrestrial",
        Aquatic => "aquatic",
        Arboreal => "arboreal",
        Humid => "humid",
    }
}

status_enum! {
    ProcedureStatus, default = Scheduled {
        Scheduled => "scheduled",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
        Failed => "failed",
    }
}

status_enum! {
    TreatmentStatus, default = Planned {
        Planned => "planned",
        InProgress => "in_progress",
        Completed => "completed",
        Flagged => "flagged",
    }
}

status_enum! {
    /// Custody state of a sample.
    SampleStatus, default = Stored {
        Stored => "stored",
        InTransit => "in_transit",
        Consumed => "consumed",
        Disposed => "disposed",
    }
}

status_enum! {
    /// What a sample was taken from.
    SampleSource, default = Unknown {
        Unknown => "unknown",
        Organism => "organism",
        Cohort => "cohort",
        Environmental => "environmental",
    }
}

status_enum! {
    /// Review state of an ethics protocol.
    ProtocolStatus, default = Draft {
        Draft => "draft",
        Submitted => "submitted",
        Approved => "approved",
        OnHold => "on_hold",
        Expired => "expired",
        Archived => "archived",
    }
}

status_enum! {
    /// Regulatory state of a permit.
    PermitStatus, default = Draft {
        Draft => "draft",
        Submitted => "submitted",
        Approved => "approved",
        OnHold => "on_hold",
        Expired => "expired",
        Archived => "archived",
    }
}

/// Checks that an enumerated field is recognized.
pub(crate) fn ensure_recognized(
    kind: super::EntityKind,
    field: &'static str,
    recognized: bool,
    value: &str,
) -> Result<(), crate::error::ValidationError> {
    if recognized {
        Ok(())
    } else {
        Err(crate::error::ValidationError::UnrecognizedValue {
            kind,
            field,
            value: value.to_string(),
        })
    }
}
