use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use consult_desk::error::AppError;
use consult_desk::workflows::consultation::{
    ScheduleError, ScheduleImporter, ScheduleSnapshot, SchedulingError, StaffId, StaffMember,
    WorkingPattern,
};
use consult_desk::workflows::notifications::{DeliveryError, MailSender, OutboundMessage};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mail transport that writes each message to the log instead of an SMTP relay.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        if message.recipients.is_empty() {
            return Err(DeliveryError::Permanent("message has no recipients".to_string()));
        }
        info!(
            job_id = %message.job_id,
            to = %message.recipients.join(", "),
            subject = %message.subject,
            "mail delivered to log transport"
        );
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// The first Monday strictly after `today`.
pub(crate) fn next_monday(today: NaiveDate) -> NaiveDate {
    let ahead = 7 - today.weekday().num_days_from_monday();
    today + chrono::Duration::days(i64::from(ahead))
}

fn clock(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Built-in schedule used when no CSV export is configured.
pub(crate) fn demo_schedule() -> Result<ScheduleSnapshot, AppError> {
    let avery = StaffId("A".to_string());
    let blake = StaffId("B".to_string());
    let invalid = |err: ScheduleError| {
        AppError::Scheduling(SchedulingError::InvalidInput(format!(
            "built-in schedule is invalid: {err}"
        )))
    };

    let patterns = vec![
        WorkingPattern::new(avery.clone(), Weekday::Mon, clock(9, 0), clock(10, 0), 30, Some(2))
            .map_err(invalid)?,
        WorkingPattern::new(avery.clone(), Weekday::Wed, clock(13, 0), clock(16, 0), 30, Some(4))
            .map_err(invalid)?,
        WorkingPattern::new(blake.clone(), Weekday::Tue, clock(10, 0), clock(12, 15), 45, None)
            .map_err(invalid)?,
        WorkingPattern::new(blake.clone(), Weekday::Thu, clock(14, 0), clock(17, 0), 60, Some(2))
            .map_err(invalid)?,
    ];

    Ok(ScheduleSnapshot {
        staff: vec![
            StaffMember {
                id: avery,
                display_name: "Avery Stone".to_string(),
                email: "avery.stone@example.com".to_string(),
                active: true,
            },
            StaffMember {
                id: blake,
                display_name: "Blake Reyes".to_string(),
                email: "blake.reyes@example.com".to_string(),
                active: true,
            },
        ],
        patterns,
        exceptions: Vec::new(),
    })
}

/// Schedule from the CSV export when one is given, otherwise the built-in schedule.
pub(crate) fn load_schedule(path: Option<&Path>) -> Result<ScheduleSnapshot, AppError> {
    match path {
        Some(path) => {
            let snapshot = ScheduleImporter::from_path(path)?;
            info!(
                path = %path.display(),
                staff = snapshot.staff.len(),
                patterns = snapshot.patterns.len(),
                exceptions = snapshot.exceptions.len(),
                "schedule imported"
            );
            Ok(snapshot)
        }
        None => demo_schedule(),
    }
}
