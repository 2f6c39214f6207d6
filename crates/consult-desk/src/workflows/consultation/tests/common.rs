use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde_json::Value;

use crate::workflows::consultation::domain::{
    Booking, BookingId, BookingStatus, NewBooking, ReservationRequest, ScheduleException,
    StaffId, StaffMember, TimeRange, WorkingPattern,
};
use crate::workflows::consultation::memory::{InMemoryScheduleStore, ScheduleSnapshot};
use crate::workflows::consultation::service::{BookingSettings, ConsultationService, FixedClock};
use crate::workflows::consultation::store::{
    CommitOutcome, DayLedger, LedgerVersion, ScheduleStore, StoreError,
};
use crate::workflows::notifications::{
    EventType, InMemoryNotificationQueue, JobId, JobState, NewNotification, NotificationJob,
    NotificationQueue, QueueError,
};

pub(super) fn staff_a() -> StaffId {
    StaffId("A".to_string())
}

/// Wednesday; every fixture date below is on or after it.
pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 1).expect("valid date")
}

pub(super) fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 6).expect("valid date")
}

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap()
}

pub(super) fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

pub(super) fn range(start: (u32, u32), end: (u32, u32)) -> TimeRange {
    TimeRange::new(time(start.0, start.1), time(end.0, end.1)).expect("valid range")
}

pub(super) fn snapshot() -> ScheduleSnapshot {
    ScheduleSnapshot {
        staff: vec![
            StaffMember {
                id: staff_a(),
                display_name: "Avery Stone".to_string(),
                email: "avery@example.com".to_string(),
                active: true,
            },
            StaffMember {
                id: StaffId("B".to_string()),
                display_name: "Blake Reyes".to_string(),
                email: "blake@example.com".to_string(),
                active: false,
            },
        ],
        patterns: vec![
            WorkingPattern::new(staff_a(), Weekday::Mon, time(9, 0), time(10, 0), 30, Some(2))
                .expect("valid pattern"),
            WorkingPattern::new(staff_a(), Weekday::Tue, time(13, 0), time(15, 10), 45, None)
                .expect("valid pattern"),
        ],
        exceptions: vec![
            ScheduleException::closed(
                staff_a(),
                NaiveDate::from_ymd_opt(2025, 10, 13).expect("valid date"),
            ),
            ScheduleException::custom_hours(
                staff_a(),
                NaiveDate::from_ymd_opt(2025, 10, 11).expect("valid date"),
                time(10, 0),
                time(11, 0),
                20,
                Some(1),
            )
            .expect("valid exception"),
        ],
    }
}

pub(super) fn seeded_store() -> Arc<InMemoryScheduleStore> {
    Arc::new(InMemoryScheduleStore::from_snapshot(snapshot()).expect("store loads"))
}

pub(super) fn reservation(slot: TimeRange, client_ref: &str) -> ReservationRequest {
    ReservationRequest {
        staff_id: staff_a(),
        date: monday(),
        slot,
        client_ref: client_ref.to_string(),
    }
}

pub(super) fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock {
        now: now(),
        today: today(),
    })
}

pub(super) type MemoryService = ConsultationService<InMemoryScheduleStore, InMemoryNotificationQueue>;

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryScheduleStore>,
    Arc<InMemoryNotificationQueue>,
) {
    let store = seeded_store();
    let queue = Arc::new(InMemoryNotificationQueue::default());
    let settings = BookingSettings {
        extra_recipients: vec!["frontdesk@example.com".to_string()],
        ..BookingSettings::default()
    };
    let service = ConsultationService::new(store.clone(), queue.clone(), settings, clock());
    (service, store, queue)
}

/// Store whose every call fails as if the database were down.
pub(super) struct UnavailableStore;

impl ScheduleStore for UnavailableStore {
    fn staff(&self, _id: &StaffId) -> Result<Option<StaffMember>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn working_pattern(
        &self,
        _id: &StaffId,
        _weekday: Weekday,
    ) -> Result<Option<WorkingPattern>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn exception(
        &self,
        _id: &StaffId,
        _date: NaiveDate,
    ) -> Result<Option<ScheduleException>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn day_ledger(&self, _id: &StaffId, _date: NaiveDate) -> Result<DayLedger, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn commit_booking(
        &self,
        _expected: LedgerVersion,
        _booking: NewBooking,
    ) -> Result<CommitOutcome, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn booking(&self, _id: &BookingId) -> Result<Option<Booking>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn update_booking_status(
        &self,
        _id: &BookingId,
        _status: BookingStatus,
    ) -> Result<Booking, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn bookings_created_since(&self, _since: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Schedule store wrapper whose commits always report a moved ledger.
pub(super) struct ContendedStore(pub(super) Arc<InMemoryScheduleStore>);

impl ScheduleStore for ContendedStore {
    fn staff(&self, id: &StaffId) -> Result<Option<StaffMember>, StoreError> {
        self.0.staff(id)
    }

    fn working_pattern(
        &self,
        id: &StaffId,
        weekday: Weekday,
    ) -> Result<Option<WorkingPattern>, StoreError> {
        self.0.working_pattern(id, weekday)
    }

    fn exception(
        &self,
        id: &StaffId,
        date: NaiveDate,
    ) -> Result<Option<ScheduleException>, StoreError> {
        self.0.exception(id, date)
    }

    fn day_ledger(&self, id: &StaffId, date: NaiveDate) -> Result<DayLedger, StoreError> {
        self.0.day_ledger(id, date)
    }

    fn commit_booking(
        &self,
        expected: LedgerVersion,
        _booking: NewBooking,
    ) -> Result<CommitOutcome, StoreError> {
        Ok(CommitOutcome::Stale {
            current: LedgerVersion(expected.0 + 1),
        })
    }

    fn booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        self.0.booking(id)
    }

    fn update_booking_status(
        &self,
        id: &BookingId,
        status: BookingStatus,
    ) -> Result<Booking, StoreError> {
        self.0.update_booking_status(id, status)
    }

    fn bookings_created_since(&self, since: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        self.0.bookings_created_since(since)
    }
}

/// Queue that refuses writes but still answers reads.
#[derive(Default)]
pub(super) struct OfflineQueue;

impl NotificationQueue for OfflineQueue {
    fn enqueue(
        &self,
        _notification: NewNotification,
        _now: DateTime<Utc>,
    ) -> Result<JobId, QueueError> {
        Err(QueueError::Unavailable("queue offline".to_string()))
    }

    fn claim_next(
        &self,
        _max_batch: usize,
        _now: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, QueueError> {
        Ok(Vec::new())
    }

    fn mark_sent(&self, id: &JobId, _now: DateTime<Utc>) -> Result<(), QueueError> {
        Err(QueueError::NotFound(id.clone()))
    }

    fn mark_failed(
        &self,
        id: &JobId,
        _error: &str,
        _retry_at: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<JobState, QueueError> {
        Err(QueueError::NotFound(id.clone()))
    }

    fn mark_dead(&self, id: &JobId, _error: &str, _now: DateTime<Utc>) -> Result<(), QueueError> {
        Err(QueueError::NotFound(id.clone()))
    }

    fn reclaim_stale(
        &self,
        _stale_before: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        Ok(0)
    }

    fn get(&self, _id: &JobId) -> Result<Option<NotificationJob>, QueueError> {
        Ok(None)
    }

    fn find_by_payload(
        &self,
        _event_type: EventType,
        _payload_ref: &str,
    ) -> Result<Vec<NotificationJob>, QueueError> {
        Ok(Vec::new())
    }

    fn jobs(&self, _state: Option<JobState>) -> Result<Vec<NotificationJob>, QueueError> {
        Ok(Vec::new())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
