use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::domain::{parse_clock_time, BookingId, ReservationRequest, StaffId, TimeRange};
use super::error::SchedulingError;
use super::service::ConsultationService;
use super::store::ScheduleStore;
use crate::workflows::notifications::NotificationQueue;

/// Router builder exposing slot queries, reservations, and booking status transitions.
pub fn consultation_router<S, Q>(service: Arc<ConsultationService<S, Q>>) -> Router
where
    S: ScheduleStore + 'static,
    Q: NotificationQueue + 'static,
{
    Router::new()
        .route(
            "/api/v1/staff/:staff_id/slots",
            get(slots_handler::<S, Q>),
        )
        .route("/api/v1/bookings", post(reserve_handler::<S, Q>))
        .route(
            "/api/v1/bookings/:booking_id",
            get(booking_handler::<S, Q>),
        )
        .route(
            "/api/v1/bookings/:booking_id/confirm",
            post(confirm_handler::<S, Q>),
        )
        .route(
            "/api/v1/bookings/:booking_id/cancel",
            post(cancel_handler::<S, Q>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlotQuery {
    #[serde(default)]
    pub(crate) date: Option<String>,
}

/// Raw reservation body; dates and times are parsed here so malformed values map to
/// `invalid_input`. Bodies that fail to deserialize at all get the same code.
#[derive(Debug, Deserialize)]
pub(crate) struct ReservationPayload {
    pub(crate) staff_id: String,
    pub(crate) date: String,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) client_ref: String,
}

impl ReservationPayload {
    fn into_request(self) -> Result<ReservationRequest, SchedulingError> {
        let date = parse_date(&self.date)?;
        let start = parse_clock_time(&self.start_time).ok_or_else(|| {
            SchedulingError::InvalidInput(format!("start_time '{}' is not HH:MM", self.start_time))
        })?;
        let end = parse_clock_time(&self.end_time).ok_or_else(|| {
            SchedulingError::InvalidInput(format!("end_time '{}' is not HH:MM", self.end_time))
        })?;
        let slot = TimeRange::new(start, end)
            .map_err(|err| SchedulingError::InvalidInput(err.to_string()))?;

        Ok(ReservationRequest {
            staff_id: StaffId(self.staff_id),
            date,
            slot,
            client_ref: self.client_ref,
        })
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, SchedulingError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|err| {
        SchedulingError::InvalidInput(format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
    })
}

pub(crate) fn error_response(error: SchedulingError) -> Response {
    let status = match error {
        SchedulingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        SchedulingError::NotFound(_) => StatusCode::NOT_FOUND,
        SchedulingError::CapacityExceeded { .. } | SchedulingError::SlotUnavailable { .. } => {
            StatusCode::CONFLICT
        }
        SchedulingError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, axum::Json(error.body())).into_response()
}

pub(crate) async fn slots_handler<S, Q>(
    State(service): State<Arc<ConsultationService<S, Q>>>,
    Path(staff_id): Path<String>,
    Query(query): Query<SlotQuery>,
) -> Response
where
    S: ScheduleStore + 'static,
    Q: NotificationQueue + 'static,
{
    let date = match query.date.as_deref().map(parse_date) {
        Some(Ok(date)) => date,
        Some(Err(err)) => return error_response(err),
        None => {
            return error_response(SchedulingError::InvalidInput(
                "date query parameter is required".to_string(),
            ))
        }
    };

    match service.slots(&StaffId(staff_id), date) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reserve_handler<S, Q>(
    State(service): State<Arc<ConsultationService<S, Q>>>,
    payload: Result<axum::Json<ReservationPayload>, JsonRejection>,
) -> Response
where
    S: ScheduleStore + 'static,
    Q: NotificationQueue + 'static,
{
    let request = match payload {
        Ok(axum::Json(payload)) => payload.into_request(),
        Err(rejection) => Err(SchedulingError::InvalidInput(rejection.body_text())),
    };
    let request = match request {
        Ok(request) => request,
        Err(err) => return error_response(err),
    };

    // The guard may back off on a contended ledger; keep that off the async workers.
    let outcome = tokio::task::spawn_blocking(move || service.book(request))
        .await
        .unwrap_or_else(|err| {
            Err(SchedulingError::StoreUnavailable(format!(
                "reservation task failed: {err}"
            )))
        });

    match outcome {
        Ok(receipt) => (StatusCode::CREATED, axum::Json(receipt)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn booking_handler<S, Q>(
    State(service): State<Arc<ConsultationService<S, Q>>>,
    Path(booking_id): Path<String>,
) -> Response
where
    S: ScheduleStore + 'static,
    Q: NotificationQueue + 'static,
{
    match service.booking(&BookingId(booking_id)) {
        Ok(booking) => (StatusCode::OK, axum::Json(booking)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn confirm_handler<S, Q>(
    State(service): State<Arc<ConsultationService<S, Q>>>,
    Path(booking_id): Path<String>,
) -> Response
where
    S: ScheduleStore + 'static,
    Q: NotificationQueue + 'static,
{
    match service.confirm(&BookingId(booking_id)) {
        Ok(booking) => (StatusCode::OK, axum::Json(booking)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_handler<S, Q>(
    State(service): State<Arc<ConsultationService<S, Q>>>,
    Path(booking_id): Path<String>,
) -> Response
where
    S: ScheduleStore + 'static,
    Q: NotificationQueue + 'static,
{
    match service.cancel(&BookingId(booking_id)) {
        Ok(booking) => (StatusCode::OK, axum::Json(booking)).into_response(),
        Err(err) => error_response(err),
    }
}
