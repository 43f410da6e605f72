//! Typed ID wrappers for type safety across tagforged.
//!
//! Each ID is a newtype over `Uuid`, preventing a [`TaskId`] from being
//! passed where an [`EntityId`] is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Generate a newtype ID wrapper over `Uuid`.
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Create a new random ID.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                /// Return the inner UUID value.
                #[must_use]
                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self)
                }
            }

            impl From<Uuid> for $name {
                fn from(uuid: Uuid) -> Self {
                    Self(uuid)
                }
            }

            impl From<$name> for Uuid {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

typed_id! {
    /// Unique identifier for a conversion job. Doubles as the job handle.
    JobId,
    /// Unique identifier for a tracked task in the state store.
    TaskId,
    /// Unique identifier for a domain entity such as an album record.
    EntityId,
    /// Unique identifier for an event bus subscription.
    SubscriptionId,
}

impl From<JobId> for TaskId {
    /// Every job is mirrored by a task sharing its UUID.
    fn from(id: JobId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_ne!(EntityId::new(), EntityId::new());
    }

    #[test]
    fn test_id_parse_roundtrip() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_job_id_maps_to_task_id() {
        let job = JobId::new();
        let task = TaskId::from(job);
        assert_eq!(task.as_uuid(), job.as_uuid());
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = EntityId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
