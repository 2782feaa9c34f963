//! Worker identity and lifecycle status.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Worker identifier.
///
/// Generated by the resource manager when a worker is created and used as
/// the container name, so the runtime can look the container up by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Generates a new, never reused worker ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("worker_{}", Uuid::new_v4()))
    }

    /// Creates a worker ID from a string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the ID as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Worker lifecycle status.
///
/// ```text
///   ∅ ──▶ CREATING ──▶ RUNNING ──▶ REMOVED
///            │          ▲   │
///            │          └───┘ restart
///            ▼
///          FAILED ──────────────▶ REMOVED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    /// Accepted; the container is being created.
    Creating,
    /// The container is running.
    Running,
    /// Container creation failed. Terminal until removed.
    Failed,
    /// The container and its status record are gone.
    Removed,
}

impl WorkerStatus {
    /// Returns whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Creating, Self::Running | Self::Failed | Self::Removed)
                | (Self::Running, Self::Running | Self::Removed)
                | (Self::Failed, Self::Removed)
        )
    }

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Failed => "FAILED",
            Self::Removed => "REMOVED",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value held in the status store for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Current lifecycle status.
    pub status: WorkerStatus,
}

impl WorkerRecord {
    /// Creates a record with the given status.
    #[must_use]
    pub const fn new(status: WorkerStatus) -> Self {
        Self { status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_prefixed_and_unique() {
        let a = WorkerId::generate();
        let b = WorkerId::generate();
        assert!(a.as_str().starts_with("worker_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_transitions() {
        use WorkerStatus::{Creating, Failed, Removed, Running};

        assert!(Creating.can_transition_to(Running));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Removed));
        assert!(Creating.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Removed));

        assert!(!Running.can_transition_to(Creating));
        assert!(!Failed.can_transition_to(Running));
        for next in [Creating, Running, Failed, Removed] {
            assert!(!Removed.can_transition_to(next));
        }
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_string(&WorkerRecord::new(WorkerStatus::Running)).unwrap();
        assert_eq!(json, r#"{"status":"RUNNING"}"#);
    }
}
