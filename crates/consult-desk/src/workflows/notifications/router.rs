use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use super::dispatcher::{MailSender, NotificationDispatcher};
use super::domain::JobId;
use super::queue::NotificationQueue;

/// Router exposing the on-demand dispatch trigger and job inspection.
pub fn notification_router<Q, M>(dispatcher: Arc<NotificationDispatcher<Q, M>>) -> Router
where
    Q: NotificationQueue + 'static,
    M: MailSender + 'static,
{
    Router::new()
        .route(
            "/api/v1/notifications/dispatch",
            post(dispatch_handler::<Q, M>),
        )
        .route(
            "/api/v1/notifications/jobs/:job_id",
            get(job_handler::<Q, M>),
        )
        .with_state(dispatcher)
}

pub(crate) async fn dispatch_handler<Q, M>(
    State(dispatcher): State<Arc<NotificationDispatcher<Q, M>>>,
) -> Response
where
    Q: NotificationQueue + 'static,
    M: MailSender + 'static,
{
    let summary = dispatcher.run_once(Utc::now()).await;
    (StatusCode::OK, axum::Json(summary)).into_response()
}

pub(crate) async fn job_handler<Q, M>(
    State(dispatcher): State<Arc<NotificationDispatcher<Q, M>>>,
    Path(job_id): Path<String>,
) -> Response
where
    Q: NotificationQueue + 'static,
    M: MailSender + 'static,
{
    let id = JobId(job_id);
    match dispatcher.queue().get(&id) {
        Ok(Some(job)) => (StatusCode::OK, axum::Json(job)).into_response(),
        Ok(None) => {
            let payload = json!({
                "code": "not_found",
                "message": format!("job {id} not found"),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => {
            let payload = json!({
                "code": "store_unavailable",
                "message": err.to_string(),
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::notifications::dispatcher::{DeliveryError, DispatchPolicy};
    use crate::workflows::notifications::domain::{EventType, NewNotification, OutboundMessage};
    use crate::workflows::notifications::memory::InMemoryNotificationQueue;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    struct AcceptingSender;

    #[async_trait]
    impl MailSender for AcceptingSender {
        async fn send(&self, _message: &OutboundMessage) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn dispatcher() -> Arc<NotificationDispatcher<InMemoryNotificationQueue, AcceptingSender>> {
        Arc::new(NotificationDispatcher::new(
            Arc::new(InMemoryNotificationQueue::default()),
            Arc::new(AcceptingSender),
            DispatchPolicy::default(),
        ))
    }

    async fn read_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn dispatch_route_reports_summary() {
        let dispatcher = dispatcher();
        let id = dispatcher
            .queue()
            .enqueue(
                NewNotification {
                    event_type: EventType::BookingCreated,
                    payload_ref: "bk-000001".to_string(),
                    recipients: vec!["staff-a@example.com".to_string()],
                    details: BTreeMap::new(),
                },
                Utc::now(),
            )
            .expect("enqueue");

        let response = notification_router(dispatcher.clone())
            .oneshot(
                Request::post("/api/v1/notifications/dispatch")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["processed_count"], 1);
        assert_eq!(payload["sent_count"], 1);
        assert_eq!(payload["failed_count"], 0);
        assert_eq!(payload["status"], "completed");

        let response = notification_router(dispatcher)
            .oneshot(
                Request::get(format!("/api/v1/notifications/jobs/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["state"], "sent");
        assert_eq!(payload["event_type"], "booking_created");
    }

    #[tokio::test]
    async fn unknown_job_returns_not_found() {
        let response = notification_router(dispatcher())
            .oneshot(
                Request::get("/api/v1/notifications/jobs/job-999999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(response).await["code"], "not_found");
    }
}
