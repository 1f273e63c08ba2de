//! Run identity for tracking pipeline executions.

use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one execution of a pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique ID for this pipeline run.
    pub run_id: Uuid,
    /// The pipeline being run.
    pub pipeline: String,
    /// Owner identity, used for failure notifications.
    pub owner: String,
    /// When the run was created.
    pub started_at: Timestamp,
}

impl RunIdentity {
    /// Creates a new run identity with a generated run ID.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::with_run_id(Uuid::new_v4(), pipeline, owner)
    }

    /// Creates a run identity with a specific run ID.
    #[must_use]
    pub fn with_run_id(run_id: Uuid, pipeline: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            run_id,
            pipeline: pipeline.into(),
            owner: owner.into(),
            started_at: now_utc(),
        }
    }

    /// Returns the first eight characters of the run ID.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }
}
