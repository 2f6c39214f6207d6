use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc, Weekday};

use super::domain::{
    Booking, BookingId, BookingStatus, NewBooking, ScheduleException, StaffId, StaffMember,
    WorkingPattern,
};
use super::store::{CommitOutcome, DayLedger, LedgerVersion, ScheduleStore, StoreError};

/// Schedule data handed over by staff-management tooling (or the CSV importer).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    pub staff: Vec<StaffMember>,
    pub patterns: Vec<WorkingPattern>,
    pub exceptions: Vec<ScheduleException>,
}

type DayKey = (StaffId, NaiveDate);

#[derive(Debug, Default)]
struct DayRecord {
    version: LedgerVersion,
    bookings: Vec<Booking>,
}

#[derive(Debug, Default)]
struct ScheduleState {
    staff: HashMap<StaffId, StaffMember>,
    patterns: HashMap<(StaffId, Weekday), WorkingPattern>,
    exceptions: HashMap<DayKey, ScheduleException>,
    days: HashMap<DayKey, DayRecord>,
    index: HashMap<BookingId, DayKey>,
}

/// Process-local `ScheduleStore` whose per-day ledger versions behave like row versions.
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    state: RwLock<ScheduleState>,
    sequence: AtomicU64,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ScheduleSnapshot) -> Result<Self, StoreError> {
        let store = Self::new();
        store.load(snapshot)?;
        Ok(store)
    }

    /// Merges schedule records; existing bookings are left untouched.
    pub fn load(&self, snapshot: ScheduleSnapshot) -> Result<(), StoreError> {
        let mut state = self.write()?;
        for member in snapshot.staff {
            state.staff.insert(member.id.clone(), member);
        }
        for pattern in snapshot.patterns {
            state
                .patterns
                .insert((pattern.staff_id.clone(), pattern.weekday), pattern);
        }
        for exception in snapshot.exceptions {
            state
                .exceptions
                .insert((exception.staff_id.clone(), exception.date), exception);
        }
        Ok(())
    }

    pub fn put_exception(&self, exception: ScheduleException) -> Result<(), StoreError> {
        self.write()?
            .exceptions
            .insert((exception.staff_id.clone(), exception.date), exception);
        Ok(())
    }

    fn next_booking_id(&self) -> BookingId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        BookingId(format!("bk-{id:06}"))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ScheduleState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("schedule state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ScheduleState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("schedule state lock poisoned".to_string()))
    }
}

impl ScheduleStore for InMemoryScheduleStore {
    fn staff(&self, id: &StaffId) -> Result<Option<StaffMember>, StoreError> {
        Ok(self.read()?.staff.get(id).cloned())
    }

    fn working_pattern(
        &self,
        id: &StaffId,
        weekday: Weekday,
    ) -> Result<Option<WorkingPattern>, StoreError> {
        Ok(self.read()?.patterns.get(&(id.clone(), weekday)).cloned())
    }

    fn exception(
        &self,
        id: &StaffId,
        date: NaiveDate,
    ) -> Result<Option<ScheduleException>, StoreError> {
        Ok(self.read()?.exceptions.get(&(id.clone(), date)).cloned())
    }

    fn day_ledger(&self, id: &StaffId, date: NaiveDate) -> Result<DayLedger, StoreError> {
        let state = self.read()?;
        let ledger = match state.days.get(&(id.clone(), date)) {
            Some(record) => {
                let mut bookings = record.bookings.clone();
                bookings.sort_by_key(|booking| booking.time);
                DayLedger {
                    version: record.version,
                    bookings,
                }
            }
            None => DayLedger::default(),
        };
        Ok(ledger)
    }

    fn commit_booking(
        &self,
        expected: LedgerVersion,
        booking: NewBooking,
    ) -> Result<CommitOutcome, StoreError> {
        let mut state = self.write()?;
        let key = (booking.staff_id.clone(), booking.date);
        let record = state.days.entry(key.clone()).or_default();

        if record.version != expected {
            return Ok(CommitOutcome::Stale {
                current: record.version,
            });
        }

        let duplicate_start = record
            .bookings
            .iter()
            .any(|existing| existing.status.is_active() && existing.time.start == booking.time.start);
        if duplicate_start {
            return Err(StoreError::Conflict);
        }

        let stored = Booking {
            id: self.next_booking_id(),
            staff_id: booking.staff_id,
            date: booking.date,
            time: booking.time,
            client_ref: booking.client_ref,
            status: BookingStatus::Pending,
            created_at: booking.created_at,
        };

        record.bookings.push(stored.clone());
        record.version = LedgerVersion(record.version.0 + 1);
        state.index.insert(stored.id.clone(), key);

        Ok(CommitOutcome::Committed(stored))
    }

    fn booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        let state = self.read()?;
        let found = state.index.get(id).and_then(|key| {
            state
                .days
                .get(key)
                .and_then(|record| record.bookings.iter().find(|booking| &booking.id == id))
                .cloned()
        });
        Ok(found)
    }

    fn update_booking_status(
        &self,
        id: &BookingId,
        status: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let mut state = self.write()?;
        let key = state.index.get(id).cloned().ok_or(StoreError::NotFound)?;
        let record = state.days.get_mut(&key).ok_or(StoreError::NotFound)?;
        let booking = record
            .bookings
            .iter_mut()
            .find(|booking| &booking.id == id)
            .ok_or(StoreError::NotFound)?;

        if !booking.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: booking.status,
                to: status,
            });
        }

        booking.status = status;
        let updated = booking.clone();
        record.version = LedgerVersion(record.version.0 + 1);
        Ok(updated)
    }

    fn bookings_created_since(&self, since: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        let state = self.read()?;
        let mut bookings: Vec<_> = state
            .days
            .values()
            .flat_map(|record| record.bookings.iter())
            .filter(|booking| booking.created_at >= since)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(bookings)
    }
}
