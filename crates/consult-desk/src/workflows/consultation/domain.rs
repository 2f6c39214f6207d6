use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier wrapper for staff members accepting consultations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StaffId(pub String);

impl fmt::Display for StaffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for stored bookings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Staff record as maintained by the staff-management tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub display_name: String,
    pub email: String,
    pub active: bool,
}

/// Half-open `[start, end)` interval of wall-clock time within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "clock_time")]
    pub start: NaiveTime,
    #[serde(with = "clock_time")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ScheduleError> {
        if start >= end {
            return Err(ScheduleError::EmptyWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn label(&self) -> String {
        format!("{} - {}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Weekly template describing when a staff member takes consultations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingPattern {
    pub staff_id: StaffId,
    pub weekday: Weekday,
    pub hours: TimeRange,
    pub slot_minutes: u32,
    pub max_bookings_per_day: Option<u32>,
}

impl WorkingPattern {
    pub fn new(
        staff_id: StaffId,
        weekday: Weekday,
        start: NaiveTime,
        end: NaiveTime,
        slot_minutes: u32,
        max_bookings_per_day: Option<u32>,
    ) -> Result<Self, ScheduleError> {
        let hours = TimeRange::new(start, end)?;
        validate_slot_minutes(slot_minutes)?;
        Ok(Self {
            staff_id,
            weekday,
            hours,
            slot_minutes,
            max_bookings_per_day,
        })
    }

    pub(crate) fn plan(&self) -> DayPlan {
        DayPlan {
            hours: self.hours,
            slot_minutes: self.slot_minutes,
            max_bookings: self.max_bookings_per_day,
        }
    }
}

/// Date-specific override that takes precedence over the weekday pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleException {
    pub staff_id: StaffId,
    pub date: NaiveDate,
    pub kind: ExceptionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExceptionKind {
    Closed,
    CustomHours {
        hours: TimeRange,
        slot_minutes: u32,
        max_bookings_per_day: Option<u32>,
    },
}

impl ScheduleException {
    pub fn closed(staff_id: StaffId, date: NaiveDate) -> Self {
        Self {
            staff_id,
            date,
            kind: ExceptionKind::Closed,
        }
    }

    pub fn custom_hours(
        staff_id: StaffId,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        slot_minutes: u32,
        max_bookings_per_day: Option<u32>,
    ) -> Result<Self, ScheduleError> {
        let hours = TimeRange::new(start, end)?;
        validate_slot_minutes(slot_minutes)?;
        Ok(Self {
            staff_id,
            date,
            kind: ExceptionKind::CustomHours {
                hours,
                slot_minutes,
                max_bookings_per_day,
            },
        })
    }

    /// `None` when the exception closes the day.
    pub(crate) fn plan(&self) -> Option<DayPlan> {
        match &self.kind {
            ExceptionKind::Closed => None,
            ExceptionKind::CustomHours {
                hours,
                slot_minutes,
                max_bookings_per_day,
            } => Some(DayPlan {
                hours: *hours,
                slot_minutes: *slot_minutes,
                max_bookings: *max_bookings_per_day,
            }),
        }
    }
}

fn validate_slot_minutes(slot_minutes: u32) -> Result<(), ScheduleError> {
    if slot_minutes == 0 || slot_minutes > 24 * 60 {
        return Err(ScheduleError::InvalidSlotDuration(slot_minutes));
    }
    Ok(())
}

/// Effective hours for one staff member on one date, after exceptions are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DayPlan {
    pub(crate) hours: TimeRange,
    pub(crate) slot_minutes: u32,
    pub(crate) max_bookings: Option<u32>,
}

impl DayPlan {
    /// Fixed-width partitions of the working window; a trailing partial slot is dropped.
    pub(crate) fn slot_ranges(&self) -> Vec<TimeRange> {
        let step = Duration::minutes(i64::from(self.slot_minutes));
        let mut ranges = Vec::new();
        let mut cursor = self.hours.start;

        loop {
            let (end, wrapped) = cursor.overflowing_add_signed(step);
            if wrapped != 0 || end > self.hours.end || end <= cursor {
                break;
            }
            ranges.push(TimeRange { start: cursor, end });
            cursor = end;
        }

        ranges
    }

    pub(crate) fn contains_slot(&self, range: &TimeRange) -> bool {
        self.slot_ranges().iter().any(|slot| slot == range)
    }
}

/// Bookable interval returned to clients; derived on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(rename = "start_time", with = "clock_time")]
    pub start: NaiveTime,
    #[serde(rename = "end_time", with = "clock_time")]
    pub end: NaiveTime,
    pub display_label: String,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Pending and confirmed bookings hold their slot and count toward the daily cap.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    pub const fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub staff_id: StaffId,
    pub date: NaiveDate,
    pub time: TimeRange,
    pub client_ref: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

/// Booking fields supplied by the guard; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub staff_id: StaffId,
    pub date: NaiveDate,
    pub time: TimeRange,
    pub client_ref: String,
    pub created_at: DateTime<Utc>,
}

/// Reservation request as received from the consultation API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub staff_id: StaffId,
    pub date: NaiveDate,
    pub slot: TimeRange,
    pub client_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("working window must start before it ends ({start} >= {end})")]
    EmptyWindow { start: NaiveTime, end: NaiveTime },
    #[error("slot duration must be between 1 and 1440 minutes, found {0}")]
    InvalidSlotDuration(u32),
}

/// Parses `HH:MM` or `HH:MM:SS` wall-clock values.
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
}

pub(crate) mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format("%H:%M").to_string())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_clock_time(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("failed to parse '{raw}' as HH:MM"))
        })
    }
}
