//! Durable notification jobs and the background dispatcher that delivers them.

pub mod dispatcher;
pub mod domain;
pub mod memory;
pub mod queue;
pub mod router;

pub use dispatcher::{
    BackoffPolicy, DeliveryError, DispatchPolicy, DispatchSignal, DispatchStatus,
    DispatchSummary, MailSender, NotificationDispatcher,
};
pub use domain::{
    EventType, JobId, JobState, NewNotification, NotificationJob, OutboundMessage,
};
pub use memory::InMemoryNotificationQueue;
pub use queue::{NotificationQueue, QueueError};
pub use router::notification_router;
