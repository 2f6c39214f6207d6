use crate::cli::ServeArgs;
use crate::infra::{load_schedule, AppState, LogMailSender};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use consult_desk::config::AppConfig;
use consult_desk::error::AppError;
use consult_desk::telemetry;
use consult_desk::workflows::consultation::{
    ConsultationService, InMemoryScheduleStore, ScheduleStore, SystemClock,
};
use consult_desk::workflows::notifications::{
    DispatchSignal, InMemoryNotificationQueue, NotificationDispatcher, NotificationQueue,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// How far back the periodic sweep looks for bookings whose notification was never queued.
const RECONCILE_LOOKBACK_HOURS: i64 = 24;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let snapshot = load_schedule(config.scheduling.schedule_csv.as_deref())?;
    let store = Arc::new(InMemoryScheduleStore::from_snapshot(snapshot)?);
    let queue = Arc::new(InMemoryNotificationQueue::new(
        config.notifications.max_attempts,
    ));
    let signal = DispatchSignal::new();

    let consultation = Arc::new(
        ConsultationService::new(
            store,
            queue.clone(),
            config.booking_settings(),
            Arc::new(SystemClock::new(config.scheduling.utc_offset)),
        )
        .with_signal(signal.clone()),
    );
    let dispatcher = Arc::new(NotificationDispatcher::with_signal(
        queue,
        Arc::new(LogMailSender),
        config.notifications.dispatch_policy(),
        signal,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher_task = {
        let dispatcher = Arc::clone(&dispatcher);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run(shutdown).await })
    };
    let reconcile_task = tokio::spawn(reconcile_loop(
        Arc::clone(&consultation),
        config.notifications.poll_interval * 4,
        shutdown_rx,
    ));

    let app = with_service_routes(consultation, dispatcher)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, utc_offset = %config.scheduling.utc_offset, "consultation booking service ready");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    readiness_flag.store(false, Ordering::Release);
    let _ = shutdown_tx.send(true);
    if let Err(err) = dispatcher_task.await {
        warn!(error = %err, "notification dispatcher task ended abnormally");
    }
    if let Err(err) = reconcile_task.await {
        warn!(error = %err, "notification reconciliation task ended abnormally");
    }

    served?;
    info!("consultation booking service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for ctrl-c; shutting down");
    }
    info!("shutdown requested");
}

/// Periodically queues notifications for bookings that committed while the queue was down.
async fn reconcile_loop<S, Q>(
    service: Arc<ConsultationService<S, Q>>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: ScheduleStore + 'static,
    Q: NotificationQueue + 'static,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let since = Utc::now() - chrono::Duration::hours(RECONCILE_LOOKBACK_HOURS);
        match service.reconcile_notifications(since) {
            Ok(0) => {}
            Ok(queued) => info!(queued, "backfilled booking notifications"),
            Err(err) => warn!(error = %err, "booking notification reconciliation failed"),
        }
    }
}
