//! Assignments: bounded leases of one sample to one labeler.
//!
//! Status machine:
//!
//! ```text
//! pending ── reserve ──► reserved ──► completed
//!    ▲                      │  ├────► skipped
//!    │                      │  └────► timed_out ──► requeued
//!    └──────────────────────┴───────────────────────────┘
//! ```
//!
//! `completed` and `skipped` are terminal. The integer `version` implements
//! optimistic locking: the store rejects updates whose version does not
//! match the stored row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Assignment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Reserved,
    Completed,
    TimedOut,
    Skipped,
    Requeued,
}

impl AssignmentStatus {
    /// Whether the machine permits `self → next`.
    pub fn can_transition_to(self, next: AssignmentStatus) -> bool {
        use AssignmentStatus::*;
        matches!(
            (self, next),
            (Pending, Reserved)
                | (Reserved, Completed)
                | (Reserved, TimedOut)
                | (Reserved, Skipped)
                | (TimedOut, Requeued)
                | (Requeued, Pending)
                | (Requeued, Reserved)
        )
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, AssignmentStatus::Completed | AssignmentStatus::Skipped)
    }
}

/// A lease of one sample to one labeler for a bounded time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub queue_id: String,
    pub sample_id: String,
    pub tenant_id: String,
    /// Unset while the slot is pending and unowned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeler_id: Option<String>,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub timeout_seconds: i64,
    #[serde(default)]
    pub requeue_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requeue_delay_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Optimistic-lock version, starts at 1 and increments on every store
    /// update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    /// Create an unowned pending slot for a sample.
    pub fn pending(
        queue_id: impl Into<String>,
        sample_id: impl Into<String>,
        tenant_id: impl Into<String>,
        timeout_seconds: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            queue_id: queue_id.into(),
            sample_id: sample_id.into(),
            tenant_id: tenant_id.into(),
            labeler_id: None,
            status: AssignmentStatus::Pending,
            reserved_at: None,
            deadline: None,
            timeout_seconds,
            requeue_attempts: 0,
            requeue_delay_until: None,
            skip_reason: None,
            version: 1,
            created_at,
        }
    }

    /// Create an assignment born directly in `reserved`, as the dispatcher
    /// does when no pending slot exists.
    pub fn reserved(
        queue_id: impl Into<String>,
        sample_id: impl Into<String>,
        tenant_id: impl Into<String>,
        labeler_id: impl Into<String>,
        timeout_seconds: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let mut assignment = Self::pending(queue_id, sample_id, tenant_id, timeout_seconds, now);
        assignment.labeler_id = Some(labeler_id.into());
        assignment.status = AssignmentStatus::Reserved;
        assignment.reserved_at = Some(now);
        assignment.deadline = Some(now + chrono::Duration::seconds(timeout_seconds));
        assignment
    }

    /// Lease this slot to a labeler, stamping the reservation window.
    pub fn reserve(&mut self, labeler_id: impl Into<String>, now: DateTime<Utc>) {
        self.labeler_id = Some(labeler_id.into());
        self.status = AssignmentStatus::Reserved;
        self.reserved_at = Some(now);
        self.deadline = Some(now + chrono::Duration::seconds(self.timeout_seconds));
        self.requeue_delay_until = None;
    }

    /// Whether the reservation deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, AssignmentStatus::Reserved)
            && self.deadline.map(|d| d < now).unwrap_or(false)
    }

    /// Whether a requeued slot is eligible for re-lease.
    pub fn requeue_delay_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.requeue_delay_until.map(|t| t <= now).unwrap_or(true)
    }
}
