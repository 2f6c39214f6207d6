//! Consultation scheduling: slot availability, capacity-guarded reservations, and the
//! booking workflow that hands new bookings to the notification queue.

pub mod availability;
pub mod booking;
pub mod domain;
pub mod error;
pub mod import;
pub mod memory;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use availability::AvailabilityResolver;
pub use booking::BookingGuard;
pub use domain::{
    Booking, BookingId, BookingStatus, ExceptionKind, NewBooking, ReservationRequest,
    ScheduleError, ScheduleException, Slot, StaffId, StaffMember, TimeRange, WorkingPattern,
};
pub use error::{ErrorBody, SchedulingError};
pub use import::{ScheduleImportError, ScheduleImporter};
pub use memory::{InMemoryScheduleStore, ScheduleSnapshot};
pub use router::consultation_router;
pub use service::{
    AvailabilityView, BookingReceipt, BookingSettings, Clock, ConsultationService, FixedClock,
    NotificationStatus, SystemClock,
};
pub use store::{CommitOutcome, DayLedger, LedgerVersion, ScheduleStore, StoreError};
