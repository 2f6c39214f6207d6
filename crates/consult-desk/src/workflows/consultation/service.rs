use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::availability::AvailabilityResolver;
use super::booking::BookingGuard;
use super::domain::{Booking, BookingId, BookingStatus, ReservationRequest, Slot, StaffId};
use super::error::SchedulingError;
use super::store::{ScheduleStore, StoreError};
use crate::workflows::notifications::{
    DispatchSignal, EventType, JobId, NewNotification, NotificationQueue, QueueError,
};

/// Source of "now" and of today's date in the configured schedule zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

/// Wall clock pinned to the single configured schedule offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}

/// Frozen clock for demos and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}

/// Booking-side settings sourced from `AppConfig`.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub lock_timeout: Duration,
    /// Copied on every new-booking notification in addition to the staff member.
    pub extra_recipients: Vec<String>,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
            extra_recipients: Vec::new(),
        }
    }
}

/// Slot listing returned by the availability endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityView {
    pub staff_id: StaffId,
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum NotificationStatus {
    Queued { job_id: JobId },
    /// The booking stands; `reconcile_notifications` will enqueue it later.
    Deferred { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingReceipt {
    pub booking: Booking,
    pub notification: NotificationStatus,
}

/// Service composing the availability resolver, booking guard, and notification queue.
pub struct ConsultationService<S, Q> {
    store: Arc<S>,
    queue: Arc<Q>,
    resolver: AvailabilityResolver<S>,
    guard: BookingGuard<S>,
    clock: Arc<dyn Clock>,
    signal: Option<DispatchSignal>,
    extra_recipients: Vec<String>,
}

impl<S, Q> ConsultationService<S, Q>
where
    S: ScheduleStore + 'static,
    Q: NotificationQueue + 'static,
{
    pub fn new(
        store: Arc<S>,
        queue: Arc<Q>,
        settings: BookingSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let resolver = AvailabilityResolver::new(store.clone());
        let guard = BookingGuard::with_lock_timeout(store.clone(), settings.lock_timeout);

        Self {
            store,
            queue,
            resolver,
            guard,
            clock,
            signal: None,
            extra_recipients: settings.extra_recipients,
        }
    }

    /// Raise `signal` after every enqueue so a running dispatcher picks the job up promptly.
    pub fn with_signal(mut self, signal: DispatchSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn slots(
        &self,
        staff_id: &StaffId,
        date: NaiveDate,
    ) -> Result<AvailabilityView, SchedulingError> {
        let slots = self.resolver.resolve(staff_id, date, self.clock.today())?;
        Ok(AvailabilityView {
            staff_id: staff_id.clone(),
            date,
            slots,
        })
    }

    /// Reserve a slot and queue the staff notification.
    ///
    /// Enqueue problems never fail the booking: the receipt reports the notification as
    /// deferred and the error is logged.
    pub fn book(&self, request: ReservationRequest) -> Result<BookingReceipt, SchedulingError> {
        let booking = self
            .guard
            .reserve(request, self.clock.today(), self.clock.now())?;

        let notification = match self.enqueue_booking_created(&booking) {
            Ok(job_id) => {
                if let Some(signal) = &self.signal {
                    signal.notify();
                }
                NotificationStatus::Queued { job_id }
            }
            Err(err) => {
                error!(
                    booking_id = %booking.id,
                    error = %err,
                    "booking stored but notification could not be queued"
                );
                NotificationStatus::Deferred {
                    reason: err.to_string(),
                }
            }
        };

        Ok(BookingReceipt {
            booking,
            notification,
        })
    }

    pub fn booking(&self, id: &BookingId) -> Result<Booking, SchedulingError> {
        self.store
            .booking(id)?
            .ok_or_else(|| SchedulingError::NotFound(format!("booking {id} not found")))
    }

    pub fn confirm(&self, id: &BookingId) -> Result<Booking, SchedulingError> {
        self.transition(id, BookingStatus::Confirmed)
    }

    pub fn cancel(&self, id: &BookingId) -> Result<Booking, SchedulingError> {
        self.transition(id, BookingStatus::Cancelled)
    }

    fn transition(
        &self,
        id: &BookingId,
        status: BookingStatus,
    ) -> Result<Booking, SchedulingError> {
        let booking = self
            .store
            .update_booking_status(id, status)
            .map_err(|err| match err {
                StoreError::NotFound => {
                    SchedulingError::NotFound(format!("booking {id} not found"))
                }
                other => other.into(),
            })?;
        info!(booking_id = %id, status = booking.status.label(), "booking status updated");
        Ok(booking)
    }

    /// Queue notifications for bookings created since `since` that have no job yet.
    pub fn reconcile_notifications(&self, since: DateTime<Utc>) -> Result<usize, SchedulingError> {
        let mut queued = 0;
        for booking in self.store.bookings_created_since(since)? {
            let existing = self
                .queue
                .find_by_payload(EventType::BookingCreated, &booking.id.0)
                .map_err(queue_unavailable)?;
            if !existing.is_empty() {
                continue;
            }

            match self.enqueue_booking_created(&booking) {
                Ok(job_id) => {
                    warn!(booking_id = %booking.id, %job_id, "queued missing booking notification");
                    queued += 1;
                }
                Err(QueueError::Unavailable(reason)) => {
                    return Err(SchedulingError::StoreUnavailable(reason));
                }
                Err(err) => {
                    error!(booking_id = %booking.id, error = %err, "booking notification still cannot be queued");
                }
            }
        }

        if queued > 0 {
            if let Some(signal) = &self.signal {
                signal.notify();
            }
        }
        Ok(queued)
    }

    fn enqueue_booking_created(&self, booking: &Booking) -> Result<JobId, QueueError> {
        let staff = self
            .store
            .staff(&booking.staff_id)
            .map_err(|err| QueueError::Unavailable(err.to_string()))?;

        let mut recipients = Vec::with_capacity(1 + self.extra_recipients.len());
        let mut details = BTreeMap::new();
        if let Some(member) = &staff {
            recipients.push(member.email.clone());
            details.insert("staff".to_string(), member.display_name.clone());
        }
        recipients.extend(self.extra_recipients.iter().cloned());

        details.insert("staff_id".to_string(), booking.staff_id.0.clone());
        details.insert("date".to_string(), booking.date.to_string());
        details.insert("time".to_string(), booking.time.label());
        details.insert("client".to_string(), booking.client_ref.clone());
        details.insert("status".to_string(), booking.status.label().to_string());

        self.queue.enqueue(
            NewNotification {
                event_type: EventType::BookingCreated,
                payload_ref: booking.id.0.clone(),
                recipients,
                details,
            },
            self.clock.now(),
        )
    }
}

fn queue_unavailable(err: QueueError) -> SchedulingError {
    SchedulingError::StoreUnavailable(err.to_string())
}
