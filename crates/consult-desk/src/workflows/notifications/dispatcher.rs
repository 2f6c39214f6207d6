use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::domain::{JobState, NotificationJob, OutboundMessage};
use super::queue::{NotificationQueue, QueueError};

/// Outbound mail transport. Implementations must tolerate receiving the same job twice.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Worth retrying later (network trouble, throttling, timeouts).
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// Retrying cannot help (unknown mailbox, rejected recipient).
    #[error("delivery permanently refused: {0}")]
    Permanent(String),
}

/// Exponential retry spacing: `base * 2^(attempts - 1)`, never above `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(30);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            cap: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub batch_size: usize,
    pub send_timeout: Duration,
    pub poll_interval: Duration,
    pub stale_after: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 10,
            send_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(15),
            stale_after: Duration::from_secs(300),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Wakes the dispatcher early, typically right after a booking enqueues a job.
#[derive(Debug, Clone, Default)]
pub struct DispatchSignal(Arc<Notify>);

impl DispatchSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.0.notify_one();
    }

    pub async fn notified(&self) {
        self.0.notified().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Nothing was due.
    Idle,
    Completed,
    /// The queue itself failed at least once during the pass.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub processed_count: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub dead_count: usize,
    pub reclaimed_count: usize,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl DispatchSummary {
    fn empty() -> Self {
        Self {
            processed_count: 0,
            sent_count: 0,
            failed_count: 0,
            dead_count: 0,
            reclaimed_count: 0,
            status: DispatchStatus::Idle,
            errors: Vec::new(),
        }
    }

    fn record_queue_error(&mut self, err: QueueError) {
        warn!(error = %err, "notification queue operation failed");
        self.errors.push(err.to_string());
        self.status = DispatchStatus::Degraded;
    }
}

enum Outcome {
    Sent,
    Retrying,
    Dead,
}

/// Drains the notification queue outside of any request/response cycle.
pub struct NotificationDispatcher<Q, M> {
    queue: Arc<Q>,
    sender: Arc<M>,
    policy: DispatchPolicy,
    signal: DispatchSignal,
}

impl<Q, M> NotificationDispatcher<Q, M>
where
    Q: NotificationQueue + 'static,
    M: MailSender + 'static,
{
    pub fn new(queue: Arc<Q>, sender: Arc<M>, policy: DispatchPolicy) -> Self {
        Self::with_signal(queue, sender, policy, DispatchSignal::new())
    }

    pub fn with_signal(
        queue: Arc<Q>,
        sender: Arc<M>,
        policy: DispatchPolicy,
        signal: DispatchSignal,
    ) -> Self {
        Self {
            queue,
            sender,
            policy,
            signal,
        }
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    pub fn signal(&self) -> DispatchSignal {
        self.signal.clone()
    }

    /// One pass: reclaim abandoned claims, claim a batch, deliver, record outcomes.
    ///
    /// Every outcome is recorded at `now`; the background loop stamps each send separately.
    pub async fn run_once(&self, now: DateTime<Utc>) -> DispatchSummary {
        self.pass(now, move || now).await
    }

    async fn pass<F>(&self, now: DateTime<Utc>, settled_at: F) -> DispatchSummary
    where
        F: Fn() -> DateTime<Utc> + Sync,
    {
        let mut summary = DispatchSummary::empty();

        let stale_before = now - to_chrono(self.policy.stale_after);
        match self.queue.reclaim_stale(stale_before, now) {
            Ok(count) => {
                if count > 0 {
                    warn!(count, "reclaimed notification jobs abandoned in flight");
                }
                summary.reclaimed_count = count;
            }
            Err(err) => summary.record_queue_error(err),
        }

        let batch = match self.queue.claim_next(self.policy.batch_size, now) {
            Ok(batch) => batch,
            Err(err) => {
                summary.record_queue_error(err);
                return summary;
            }
        };

        for job in batch {
            summary.processed_count += 1;
            match self.deliver(&job, &settled_at).await {
                Ok(Outcome::Sent) => summary.sent_count += 1,
                Ok(Outcome::Retrying) => summary.failed_count += 1,
                Ok(Outcome::Dead) => {
                    summary.failed_count += 1;
                    summary.dead_count += 1;
                }
                Err(err) => summary.record_queue_error(err),
            }
        }

        if summary.processed_count > 0 && summary.status == DispatchStatus::Idle {
            summary.status = DispatchStatus::Completed;
        }
        summary
    }

    async fn deliver<F>(&self, job: &NotificationJob, settled_at: &F) -> Result<Outcome, QueueError>
    where
        F: Fn() -> DateTime<Utc> + Sync,
    {
        let message = OutboundMessage::for_job(job);
        let attempt = job.attempts + 1;

        let result = match tokio::time::timeout(self.policy.send_timeout, self.sender.send(&message))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Transient(format!(
                "mail sender timed out after {:?}",
                self.policy.send_timeout
            ))),
        };
        let now = settled_at();

        match result {
            Ok(()) => {
                self.queue.mark_sent(&job.id, now)?;
                info!(job_id = %job.id, event = job.event_type.as_str(), payload = %job.payload_ref, attempt, "notification sent");
                Ok(Outcome::Sent)
            }
            Err(DeliveryError::Permanent(reason)) => {
                self.queue.mark_dead(&job.id, &reason, now)?;
                warn!(job_id = %job.id, attempt, %reason, "notification refused; dead-lettered");
                Ok(Outcome::Dead)
            }
            Err(DeliveryError::Transient(reason)) => {
                let delay = self.policy.backoff.delay_for(attempt);
                let retry_at = now + to_chrono(delay);
                let state = self.queue.mark_failed(&job.id, &reason, retry_at, now)?;
                if state == JobState::Dead {
                    warn!(job_id = %job.id, attempt, %reason, "notification retries exhausted; dead-lettered");
                    Ok(Outcome::Dead)
                } else {
                    debug!(job_id = %job.id, attempt, %reason, %retry_at, "notification delivery failed; retry scheduled");
                    Ok(Outcome::Retrying)
                }
            }
        }
    }

    /// Runs passes on every poll tick or signal until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.policy.batch_size,
            poll_interval = ?self.policy.poll_interval,
            "notification dispatcher started"
        );

        let mut ticker = tokio::time::interval(self.policy.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.signal.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let summary = self.pass(Utc::now(), Utc::now).await;
            if summary.processed_count > 0 || summary.reclaimed_count > 0 {
                info!(
                    processed = summary.processed_count,
                    sent = summary.sent_count,
                    failed = summary.failed_count,
                    dead = summary.dead_count,
                    reclaimed = summary.reclaimed_count,
                    status = ?summary.status,
                    "notification dispatch pass finished"
                );
            }
        }

        info!("notification dispatcher stopped");
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
