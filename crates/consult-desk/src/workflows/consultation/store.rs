use chrono::{DateTime, NaiveDate, Utc, Weekday};

use super::domain::{
    Booking, BookingId, BookingStatus, NewBooking, ScheduleException, StaffId, StaffMember,
    WorkingPattern,
};

/// Monotonic version of one (staff, date) booking ledger. Every committed write bumps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LedgerVersion(pub u64);

/// Consistent read of every booking recorded for one staff member on one date.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DayLedger {
    pub version: LedgerVersion,
    pub bookings: Vec<Booking>,
}

impl DayLedger {
    /// Bookings that hold their slot (pending or confirmed).
    pub fn active(&self) -> impl Iterator<Item = &Booking> {
        self.bookings
            .iter()
            .filter(|booking| booking.status.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}

/// Result of a conditional booking insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(Booking),
    /// The ledger moved past the expected version; the caller must re-read and re-validate.
    Stale { current: LedgerVersion },
}

/// Persistence boundary for staff schedules and bookings.
///
/// The per-day ledger version is the serialization point for reservations: a booking is only
/// inserted when nobody else has written to the same (staff, date) ledger since it was read.
pub trait ScheduleStore: Send + Sync {
    fn staff(&self, id: &StaffId) -> Result<Option<StaffMember>, StoreError>;
    fn working_pattern(
        &self,
        id: &StaffId,
        weekday: Weekday,
    ) -> Result<Option<WorkingPattern>, StoreError>;
    fn exception(
        &self,
        id: &StaffId,
        date: NaiveDate,
    ) -> Result<Option<ScheduleException>, StoreError>;
    fn day_ledger(&self, id: &StaffId, date: NaiveDate) -> Result<DayLedger, StoreError>;
    fn commit_booking(
        &self,
        expected: LedgerVersion,
        booking: NewBooking,
    ) -> Result<CommitOutcome, StoreError>;
    fn booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError>;
    fn update_booking_status(
        &self,
        id: &BookingId,
        status: BookingStatus,
    ) -> Result<Booking, StoreError>;
    fn bookings_created_since(&self, since: DateTime<Utc>) -> Result<Vec<Booking>, StoreError>;
}

/// Error enumeration for schedule store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("an active booking already starts at that time")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("cannot move booking from {from:?} to {to:?}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("schedule store unavailable: {0}")]
    Unavailable(String),
}
