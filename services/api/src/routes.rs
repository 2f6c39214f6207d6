use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use consult_desk::workflows::consultation::{consultation_router, ConsultationService, ScheduleStore};
use consult_desk::workflows::notifications::{
    notification_router, MailSender, NotificationDispatcher, NotificationQueue,
};
use serde_json::json;
use std::sync::Arc;

/// Booking and notification APIs plus the operational endpoints.
pub(crate) fn with_service_routes<S, Q, M>(
    consultation: Arc<ConsultationService<S, Q>>,
    dispatcher: Arc<NotificationDispatcher<Q, M>>,
) -> axum::Router
where
    S: ScheduleStore + 'static,
    Q: NotificationQueue + 'static,
    M: MailSender + 'static,
{
    consultation_router(consultation)
        .merge(notification_router(dispatcher))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
