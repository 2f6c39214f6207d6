use serde::Serialize;

use super::store::StoreError;

/// Failure taxonomy shared by the availability resolver and the booking guard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("daily capacity of {cap} bookings reached; choose another date")]
    CapacityExceeded { cap: u32 },
    #[error("slot {slot} is no longer available; refresh availability and retry")]
    SlotUnavailable { slot: String },
    #[error("schedule store unavailable: {0}")]
    StoreUnavailable(String),
}

impl SchedulingError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::SlotUnavailable { .. } => "slot_unavailable",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Only infrastructure failures are worth re-submitting unchanged.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<StoreError> for SchedulingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
            StoreError::NotFound => Self::NotFound("record not found".to_string()),
            StoreError::Conflict => Self::SlotUnavailable {
                slot: "requested".to_string(),
            },
            StoreError::InvalidTransition { from, to } => Self::InvalidInput(format!(
                "booking cannot move from {} to {}",
                from.label(),
                to.label()
            )),
        }
    }
}

/// Machine-readable error payload returned by the consultation API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}
