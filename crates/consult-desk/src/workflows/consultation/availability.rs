use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use super::domain::{DayPlan, Slot, StaffId, StaffMember};
use super::error::SchedulingError;
use super::store::ScheduleStore;

/// Turns a staff member's working pattern and exceptions into bookable slots for one date.
pub struct AvailabilityResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for AvailabilityResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> AvailabilityResolver<S>
where
    S: ScheduleStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Chronological slots for `staff_id` on `date`; dates before `today` resolve to nothing.
    pub fn resolve(
        &self,
        staff_id: &StaffId,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<Slot>, SchedulingError> {
        active_staff(self.store.as_ref(), staff_id)?;

        if date < today {
            debug!(%staff_id, %date, "availability requested for a past date");
            return Ok(Vec::new());
        }

        let Some(plan) = day_plan(self.store.as_ref(), staff_id, date)? else {
            return Ok(Vec::new());
        };

        let ledger = self.store.day_ledger(staff_id, date)?;
        let taken: Vec<_> = ledger.active().map(|booking| booking.time).collect();

        let slots = plan
            .slot_ranges()
            .into_iter()
            .map(|range| Slot {
                start: range.start,
                end: range.end,
                display_label: range.label(),
                available: !taken.iter().any(|booked| booked.overlaps(&range)),
            })
            .collect();

        Ok(slots)
    }
}

/// Fails with `NotFound` unless the staff member exists and is active.
pub(crate) fn active_staff<S: ScheduleStore + ?Sized>(
    store: &S,
    staff_id: &StaffId,
) -> Result<StaffMember, SchedulingError> {
    match store.staff(staff_id)? {
        Some(member) if member.active => Ok(member),
        Some(_) => Err(SchedulingError::NotFound(format!(
            "staff member {staff_id} is not accepting consultations"
        ))),
        None => Err(SchedulingError::NotFound(format!(
            "unknown staff member {staff_id}"
        ))),
    }
}

/// Effective hours for the date: an exception wins over the weekday pattern.
pub(crate) fn day_plan<S: ScheduleStore + ?Sized>(
    store: &S,
    staff_id: &StaffId,
    date: NaiveDate,
) -> Result<Option<DayPlan>, SchedulingError> {
    if let Some(exception) = store.exception(staff_id, date)? {
        return Ok(exception.plan());
    }

    let pattern = store.working_pattern(staff_id, date.weekday())?;
    Ok(pattern.map(|pattern| pattern.plan()))
}
