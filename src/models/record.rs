use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current time truncated to the precision stored in SQLite (microseconds),
/// so a timestamp survives a write/read cycle unchanged.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// The four kinds of record mirrored between the local and remote stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Animal,
    HealthRecord,
    MilkProduction,
    ReproductionRecord,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Animal,
        EntityKind::HealthRecord,
        EntityKind::MilkProduction,
        EntityKind::ReproductionRecord,
    ];

    /// Name of the remote collection holding this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Animal => "animals",
            EntityKind::HealthRecord => "health_records",
            EntityKind::MilkProduction => "milk_production",
            EntityKind::ReproductionRecord => "reproduction_records",
        }
    }

    pub fn from_collection(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection())
    }
}

/// Identity, authorship, timestamps and the synchronized flag shared by every
/// record kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    /// Empty until the record is first saved.
    pub id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
}

impl RecordMeta {
    /// Metadata for a record that has never been saved.
    pub fn draft() -> Self {
        let now = now();
        Self {
            id: String::new(),
            created_by: String::new(),
            created_at: now,
            updated_at: now,
            synced: false,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_empty()
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::draft()
    }
}

/// A record that lives in both stores under the same identity.
pub trait SyncRecord:
    Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: EntityKind;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// The owning animal, for kinds that hang off an animal.
    fn owner_id(&self) -> Option<&str> {
        None
    }

    fn id(&self) -> &str {
        &self.meta().id
    }
}

/// Typed partial updates: one `Change` variant per settable payload field.
pub trait Patch {
    type Change;

    fn apply(&mut self, change: Self::Change);

    fn apply_all(&mut self, changes: impl IntoIterator<Item = Self::Change>) {
        for change in changes {
            self.apply(change);
        }
    }
}

/// Declares a fieldless enum stored and transmitted as a lowercase string.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($label:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!(
                        "Invalid {} '{}'. Valid options: {}",
                        $label,
                        s,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use text_enum;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_has_microsecond_precision() {
        let ts = now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_draft_meta_is_new_and_unsynced() {
        let meta = RecordMeta::draft();
        assert!(meta.is_new());
        assert!(!meta.synced);
        assert_eq!(meta.created_at, meta.updated_at);
    }

    #[test]
    fn test_collection_names_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_collection(kind.collection()), Some(kind));
        }
        assert_eq!(EntityKind::from_collection("pastures"), None);
    }
}
