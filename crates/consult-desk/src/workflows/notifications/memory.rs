use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{EventType, JobId, JobState, NewNotification, NotificationJob};
use super::queue::{NotificationQueue, QueueError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const ABANDONED_CLAIM: &str = "claim abandoned before the outcome was recorded";

/// Process-local `NotificationQueue`; every state transition happens under one lock.
#[derive(Debug)]
pub struct InMemoryNotificationQueue {
    jobs: Mutex<BTreeMap<JobId, NotificationJob>>,
    sequence: AtomicU64,
    max_attempts: u32,
}

impl Default for InMemoryNotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl InMemoryNotificationQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            jobs: Mutex::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
            max_attempts: max_attempts.max(1),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<JobId, NotificationJob>>, QueueError> {
        self.jobs
            .lock()
            .map_err(|_| QueueError::Unavailable("notification queue lock poisoned".to_string()))
    }

    fn next_job_id(&self) -> JobId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        JobId(format!("job-{id:06}"))
    }
}

fn in_flight<'a>(
    jobs: &'a mut BTreeMap<JobId, NotificationJob>,
    id: &JobId,
) -> Result<&'a mut NotificationJob, QueueError> {
    let job = jobs
        .get_mut(id)
        .ok_or_else(|| QueueError::NotFound(id.clone()))?;
    if job.state != JobState::InFlight {
        return Err(QueueError::NotInFlight {
            id: id.clone(),
            state: job.state,
        });
    }
    Ok(job)
}

impl NotificationQueue for InMemoryNotificationQueue {
    fn enqueue(
        &self,
        notification: NewNotification,
        now: DateTime<Utc>,
    ) -> Result<JobId, QueueError> {
        let recipients: Vec<String> = notification
            .recipients
            .into_iter()
            .map(|recipient| recipient.trim().to_string())
            .filter(|recipient| !recipient.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(QueueError::NoRecipients);
        }

        let id = self.next_job_id();
        let job = NotificationJob {
            id: id.clone(),
            event_type: notification.event_type,
            payload_ref: notification.payload_ref,
            recipients,
            details: notification.details,
            state: JobState::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            next_attempt_at: now,
            claimed_at: None,
        };

        self.lock()?.insert(id.clone(), job);
        Ok(id)
    }

    fn claim_next(
        &self,
        max_batch: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, QueueError> {
        let mut jobs = self.lock()?;

        let mut due: Vec<(DateTime<Utc>, JobId)> = jobs
            .values()
            .filter(|job| job.state == JobState::Pending && job.next_attempt_at <= now)
            .map(|job| (job.next_attempt_at, job.id.clone()))
            .collect();
        due.sort();
        due.truncate(max_batch);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(job) = jobs.get_mut(&id) {
                job.state = JobState::InFlight;
                job.claimed_at = Some(now);
                job.updated_at = now;
                claimed.push(job.clone());
            }
        }

        Ok(claimed)
    }

    fn mark_sent(&self, id: &JobId, now: DateTime<Utc>) -> Result<(), QueueError> {
        let mut jobs = self.lock()?;
        let job = in_flight(&mut jobs, id)?;
        job.state = JobState::Sent;
        job.attempts += 1;
        job.claimed_at = None;
        job.updated_at = now;
        Ok(())
    }

    fn mark_failed(
        &self,
        id: &JobId,
        error: &str,
        retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<JobState, QueueError> {
        let max_attempts = self.max_attempts;
        let mut jobs = self.lock()?;
        let job = in_flight(&mut jobs, id)?;

        job.attempts += 1;
        job.last_error = Some(error.to_string());
        job.claimed_at = None;
        job.updated_at = now;
        if job.attempts >= max_attempts {
            job.state = JobState::Dead;
        } else {
            job.state = JobState::Pending;
            job.next_attempt_at = retry_at;
        }

        Ok(job.state)
    }

    fn mark_dead(&self, id: &JobId, error: &str, now: DateTime<Utc>) -> Result<(), QueueError> {
        let mut jobs = self.lock()?;
        let job = in_flight(&mut jobs, id)?;
        job.attempts += 1;
        job.last_error = Some(error.to_string());
        job.state = JobState::Dead;
        job.claimed_at = None;
        job.updated_at = now;
        Ok(())
    }

    fn reclaim_stale(
        &self,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        let max_attempts = self.max_attempts;
        let mut jobs = self.lock()?;
        let mut reclaimed = 0;

        for job in jobs.values_mut() {
            let abandoned = job.state == JobState::InFlight
                && job.claimed_at.map_or(true, |claimed| claimed < stale_before);
            if abandoned {
                // The holder may have died mid-send, so the claim burns an attempt.
                job.attempts += 1;
                job.last_error = Some(ABANDONED_CLAIM.to_string());
                job.claimed_at = None;
                job.updated_at = now;
                if job.attempts >= max_attempts {
                    job.state = JobState::Dead;
                } else {
                    job.state = JobState::Pending;
                    job.next_attempt_at = now;
                }
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }

    fn get(&self, id: &JobId) -> Result<Option<NotificationJob>, QueueError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn find_by_payload(
        &self,
        event_type: EventType,
        payload_ref: &str,
    ) -> Result<Vec<NotificationJob>, QueueError> {
        Ok(self
            .lock()?
            .values()
            .filter(|job| job.event_type == event_type && job.payload_ref == payload_ref)
            .cloned()
            .collect())
    }

    fn jobs(&self, state: Option<JobState>) -> Result<Vec<NotificationJob>, QueueError> {
        Ok(self
            .lock()?
            .values()
            .filter(|job| state.map_or(true, |wanted| job.state == wanted))
            .cloned()
            .collect())
    }
}
