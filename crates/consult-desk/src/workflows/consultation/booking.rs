use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::availability::{active_staff, day_plan};
use super::domain::{Booking, NewBooking, ReservationRequest};
use super::error::SchedulingError;
use super::store::{CommitOutcome, ScheduleStore, StoreError};

pub(crate) const MAX_CLIENT_REF_LEN: usize = 200;
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);
const STALE_BACKOFF: Duration = Duration::from_millis(2);

/// Reserves slots while keeping the daily cap and slot exclusivity intact under concurrency.
///
/// Validation and insert form one unit keyed on the (staff, date) ledger version: if another
/// reservation commits between the read and the insert, the whole check is repeated against
/// the fresh ledger until `lock_timeout` elapses.
pub struct BookingGuard<S> {
    store: Arc<S>,
    lock_timeout: Duration,
}

impl<S> Clone for BookingGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock_timeout: self.lock_timeout,
        }
    }
}

impl<S> BookingGuard<S>
where
    S: ScheduleStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_lock_timeout(store, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(store: Arc<S>, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock_timeout,
        }
    }

    pub fn reserve(
        &self,
        request: ReservationRequest,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Booking, SchedulingError> {
        let ReservationRequest {
            staff_id,
            date,
            slot,
            client_ref,
        } = request;

        let client_ref = client_ref.trim().to_string();
        if client_ref.is_empty() {
            return Err(SchedulingError::InvalidInput(
                "client reference is required".to_string(),
            ));
        }
        if client_ref.chars().count() > MAX_CLIENT_REF_LEN {
            return Err(SchedulingError::InvalidInput(format!(
                "client reference exceeds {MAX_CLIENT_REF_LEN} characters"
            )));
        }
        if date < today {
            return Err(SchedulingError::InvalidInput(format!(
                "{date} is in the past"
            )));
        }

        active_staff(self.store.as_ref(), &staff_id)?;
        let plan = day_plan(self.store.as_ref(), &staff_id, date)?.ok_or_else(|| {
            SchedulingError::NotFound(format!("{staff_id} has no consultation hours on {date}"))
        })?;

        if !plan.contains_slot(&slot) {
            return Err(SchedulingError::InvalidInput(format!(
                "{} does not match a {}-minute slot boundary",
                slot.label(),
                plan.slot_minutes
            )));
        }

        let deadline = Instant::now() + self.lock_timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let ledger = self.store.day_ledger(&staff_id, date)?;

            if let Some(cap) = plan.max_bookings {
                if ledger.active_count() >= cap as usize {
                    debug!(%staff_id, %date, cap, "reservation rejected at capacity");
                    return Err(SchedulingError::CapacityExceeded { cap });
                }
            }

            if ledger.active().any(|booking| booking.time.overlaps(&slot)) {
                debug!(%staff_id, %date, slot = %slot.label(), "reservation rejected on overlap");
                return Err(SchedulingError::SlotUnavailable { slot: slot.label() });
            }

            let candidate = NewBooking {
                staff_id: staff_id.clone(),
                date,
                time: slot,
                client_ref: client_ref.clone(),
                created_at: now,
            };

            let outcome = self
                .store
                .commit_booking(ledger.version, candidate)
                .map_err(|err| match err {
                    StoreError::Conflict => SchedulingError::SlotUnavailable { slot: slot.label() },
                    other => other.into(),
                })?;

            match outcome {
                CommitOutcome::Committed(booking) => {
                    info!(
                        booking_id = %booking.id,
                        %staff_id,
                        %date,
                        slot = %slot.label(),
                        attempts,
                        "booking reserved"
                    );
                    return Ok(booking);
                }
                CommitOutcome::Stale { current } => {
                    if Instant::now() >= deadline {
                        warn!(
                            %staff_id,
                            %date,
                            attempts,
                            "gave up waiting for a stable booking ledger"
                        );
                        return Err(SchedulingError::StoreUnavailable(format!(
                            "booking ledger for {staff_id} on {date} stayed contended for {:?}",
                            self.lock_timeout
                        )));
                    }
                    debug!(%staff_id, %date, version = current.0, "ledger moved; re-validating");
                    std::thread::sleep(STALE_BACKOFF);
                }
            }
        }
    }
}
