use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for queued notification jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BookingCreated,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookingCreated => "booking_created",
        }
    }

    pub const fn subject(self) -> &'static str {
        match self {
            Self::BookingCreated => "New consultation booking",
        }
    }
}

/// Lifecycle of a job. `Sent` and `Dead` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    InFlight,
    Sent,
    Dead,
}

impl JobState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InFlight => "In Flight",
            Self::Sent => "Sent",
            Self::Dead => "Dead",
        }
    }
}

/// One unit of outbound notification work. Jobs are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: JobId,
    pub event_type: EventType,
    pub payload_ref: String,
    pub recipients: Vec<String>,
    pub details: BTreeMap<String, String>,
    pub state: JobState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Enqueue request produced by the booking workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub event_type: EventType,
    pub payload_ref: String,
    pub recipients: Vec<String>,
    pub details: BTreeMap<String, String>,
}

/// Rendered message handed to the mail-sender capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub job_id: JobId,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutboundMessage {
    pub fn for_job(job: &NotificationJob) -> Self {
        let mut body = format!("{} ({})\n", job.event_type.subject(), job.payload_ref);
        for (key, value) in &job.details {
            body.push_str(&format!("{key}: {value}\n"));
        }

        Self {
            job_id: job.id.clone(),
            recipients: job.recipients.clone(),
            subject: format!("{}: {}", job.event_type.subject(), job.payload_ref),
            body,
        }
    }
}
