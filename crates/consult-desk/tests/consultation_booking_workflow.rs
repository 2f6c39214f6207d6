//! End-to-end booking scenarios driven through the public service facade: slot listing,
//! the daily cap, racing reservations, and the one-job-per-booking guarantee.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

    use consult_desk::workflows::consultation::{
        BookingSettings, ConsultationService, FixedClock, InMemoryScheduleStore,
        ReservationRequest, ScheduleSnapshot, StaffId, StaffMember, TimeRange, WorkingPattern,
    };
    use consult_desk::workflows::notifications::InMemoryNotificationQueue;

    pub(super) type Service = ConsultationService<InMemoryScheduleStore, InMemoryNotificationQueue>;

    pub(super) fn staff_a() -> StaffId {
        StaffId("A".to_string())
    }

    pub(super) fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 6).expect("valid date")
    }

    pub(super) fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 16, 30, 0).unwrap()
    }

    pub(super) fn slot(start: (u32, u32), end: (u32, u32)) -> TimeRange {
        TimeRange::new(
            NaiveTime::from_hms_opt(start.0, start.1, 0).expect("valid time"),
            NaiveTime::from_hms_opt(end.0, end.1, 0).expect("valid time"),
        )
        .expect("valid slot")
    }

    pub(super) fn request(range: TimeRange, client_ref: &str) -> ReservationRequest {
        ReservationRequest {
            staff_id: staff_a(),
            date: monday(),
            slot: range,
            client_ref: client_ref.to_string(),
        }
    }

    pub(super) fn service() -> (Arc<Service>, Arc<InMemoryNotificationQueue>) {
        let snapshot = ScheduleSnapshot {
            staff: vec![StaffMember {
                id: staff_a(),
                display_name: "Avery Stone".to_string(),
                email: "avery@example.com".to_string(),
                active: true,
            }],
            patterns: vec![WorkingPattern::new(
                staff_a(),
                Weekday::Mon,
                NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
                NaiveTime::from_hms_opt(10, 0, 0).expect("valid time"),
                30,
                Some(2),
            )
            .expect("valid pattern")],
            exceptions: Vec::new(),
        };
        let store = Arc::new(InMemoryScheduleStore::from_snapshot(snapshot).expect("store loads"));
        let queue = Arc::new(InMemoryNotificationQueue::default());
        let clock = Arc::new(FixedClock {
            now: now(),
            today: NaiveDate::from_ymd_opt(2025, 10, 3).expect("valid date"),
        });
        let service = ConsultationService::new(
            store,
            queue.clone(),
            BookingSettings::default(),
            clock,
        );
        (Arc::new(service), queue)
    }
}

use std::sync::{Arc, Barrier};

use common::*;
use consult_desk::workflows::consultation::{NotificationStatus, SchedulingError};
use consult_desk::workflows::notifications::{EventType, JobState, NotificationQueue};

#[test]
fn monday_schedule_walkthrough() {
    let (service, _) = service();

    let initial = service.slots(&staff_a(), monday()).expect("slots");
    let labels: Vec<_> = initial
        .slots
        .iter()
        .map(|slot| (slot.display_label.clone(), slot.available))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("09:00 - 09:30".to_string(), true),
            ("09:30 - 10:00".to_string(), true)
        ]
    );

    service
        .book(request(slot((9, 0), (9, 30)), "client-1"))
        .expect("first reservation");
    let after_first = service.slots(&staff_a(), monday()).expect("slots");
    assert!(!after_first.slots[0].available);
    assert!(after_first.slots[1].available);

    service
        .book(request(slot((9, 30), (10, 0)), "client-2"))
        .expect("second reservation");
    let third = service.book(request(slot((9, 0), (9, 30)), "client-3"));
    assert_eq!(third, Err(SchedulingError::CapacityExceeded { cap: 2 }));
}

#[test]
fn simultaneous_requests_for_one_slot_admit_one() {
    let (service, queue) = service();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["client-1", "client-2"]
        .into_iter()
        .map(|client| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                service.book(request(slot((9, 30), (10, 0)), client))
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results.iter().any(|result| matches!(
        result,
        Err(SchedulingError::SlotUnavailable { .. })
    )));
    assert_eq!(queue.jobs(None).expect("jobs").len(), 1);
}

#[test]
fn race_for_last_slot_on_a_nearly_full_day_reports_capacity() {
    let (service, queue) = service();
    service
        .book(request(slot((9, 0), (9, 30)), "client-1"))
        .expect("first reservation");
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["client-2", "client-3"]
        .into_iter()
        .map(|client| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                service.book(request(slot((9, 30), (10, 0)), client))
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();

    // The loser re-validates against a full day; the cap check runs before overlap.
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|result| *result == Err(SchedulingError::CapacityExceeded { cap: 2 })));
    assert_eq!(queue.jobs(None).expect("jobs").len(), 2);
}

#[test]
fn every_booking_gets_exactly_one_pending_job() {
    let (service, queue) = service();

    let first = service
        .book(request(slot((9, 0), (9, 30)), "client-1"))
        .expect("book");
    let second = service
        .book(request(slot((9, 30), (10, 0)), "client-2"))
        .expect("book");

    for receipt in [&first, &second] {
        assert!(matches!(
            receipt.notification,
            NotificationStatus::Queued { .. }
        ));
        let jobs = queue
            .find_by_payload(EventType::BookingCreated, &receipt.booking.id.0)
            .expect("lookup");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, JobState::Pending);
        assert_eq!(jobs[0].recipients, vec!["avery@example.com".to_string()]);
    }
}

#[test]
fn unrelated_bookings_leave_other_slots_alone() {
    let (service, _) = service();
    let before = service.slots(&staff_a(), monday()).expect("slots");

    service
        .book(request(slot((9, 0), (9, 30)), "client-1"))
        .expect("book");
    let after = service.slots(&staff_a(), monday()).expect("slots");

    assert_eq!(before.slots[1], after.slots[1]);
    assert_ne!(before.slots[0], after.slots[0]);
}
