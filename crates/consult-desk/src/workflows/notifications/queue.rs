use chrono::{DateTime, Utc};

use super::domain::{EventType, JobId, JobState, NewNotification, NotificationJob};

/// Durable job store drained by the dispatcher.
///
/// Claims are atomic per job: a job handed out by `claim_next` stays `InFlight` until its
/// holder marks it, or until `reclaim_stale` returns it to the pending pool.
pub trait NotificationQueue: Send + Sync {
    fn enqueue(
        &self,
        notification: NewNotification,
        now: DateTime<Utc>,
    ) -> Result<JobId, QueueError>;
    fn claim_next(
        &self,
        max_batch: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, QueueError>;
    fn mark_sent(&self, id: &JobId, now: DateTime<Utc>) -> Result<(), QueueError>;
    /// Records a failed attempt; the job dead-letters once the attempt ceiling is reached.
    fn mark_failed(
        &self,
        id: &JobId,
        error: &str,
        retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<JobState, QueueError>;
    fn mark_dead(&self, id: &JobId, error: &str, now: DateTime<Utc>) -> Result<(), QueueError>;
    /// Returns jobs claimed before `stale_before` to `Pending`. A reclaim burns an attempt, so a
    /// job that keeps killing its holder still reaches `Dead`.
    fn reclaim_stale(
        &self,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, QueueError>;
    fn get(&self, id: &JobId) -> Result<Option<NotificationJob>, QueueError>;
    fn find_by_payload(
        &self,
        event_type: EventType,
        payload_ref: &str,
    ) -> Result<Vec<NotificationJob>, QueueError>;
    fn jobs(&self, state: Option<JobState>) -> Result<Vec<NotificationJob>, QueueError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("notification has no recipients")]
    NoRecipients,
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {id} is {} and cannot be updated by a claim holder", .state.label())]
    NotInFlight { id: JobId, state: JobState },
    #[error("notification queue unavailable: {0}")]
    Unavailable(String),
}
