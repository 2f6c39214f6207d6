use crate::infra::{demo_schedule, load_schedule, next_monday, parse_date, LogMailSender};
use chrono::{Local, NaiveDate, NaiveTime, Utc};
use clap::Args;
use consult_desk::config::AppConfig;
use consult_desk::error::AppError;
use consult_desk::workflows::consultation::{
    AvailabilityView, BookingReceipt, BookingSettings, ConsultationService, FixedClock,
    InMemoryScheduleStore, ReservationRequest, SchedulingError, StaffId, SystemClock, TimeRange,
};
use consult_desk::workflows::notifications::{
    DispatchPolicy, DispatchSummary, InMemoryNotificationQueue, JobState, NotificationDispatcher,
    NotificationQueue,
};
use std::path::PathBuf;
use std::sync::Arc;

type DemoService = ConsultationService<InMemoryScheduleStore, InMemoryNotificationQueue>;

#[derive(Args, Debug)]
pub(crate) struct SlotsArgs {
    /// Staff identifier as it appears in the schedule
    #[arg(long)]
    pub(crate) staff: String,
    /// Consultation date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: NaiveDate,
    /// CSV schedule export; falls back to SCHEDULE_CSV, then the built-in schedule
    #[arg(long)]
    pub(crate) schedule_csv: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Monday to book against (YYYY-MM-DD). Defaults to next Monday.
    #[arg(long, value_parser = parse_date)]
    pub(crate) monday: Option<NaiveDate>,
}

pub(crate) fn run_slots(args: SlotsArgs) -> Result<(), AppError> {
    let SlotsArgs {
        staff,
        date,
        schedule_csv,
    } = args;

    let config = AppConfig::load()?;
    let path = schedule_csv.or(config.scheduling.schedule_csv.clone());
    let store = Arc::new(InMemoryScheduleStore::from_snapshot(load_schedule(
        path.as_deref(),
    )?)?);
    let service = ConsultationService::new(
        store,
        Arc::new(InMemoryNotificationQueue::default()),
        config.booking_settings(),
        Arc::new(SystemClock::new(config.scheduling.utc_offset)),
    );

    let view = service.slots(&StaffId(staff), date)?;
    render_slots(&view);
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let monday = args
        .monday
        .unwrap_or_else(|| next_monday(Local::now().date_naive()));
    let outcome = run_scenario(monday).await?;

    println!("Consultation booking demo for Monday {monday}");
    println!("\nInitial availability");
    render_slots(&outcome.initial);

    println!("\nTwo clients race for 09:30 - 10:00");
    for (client, result) in &outcome.race {
        render_attempt(client, result);
    }

    println!("\nBooking 09:00 - 09:30");
    render_attempt("client-morning", &outcome.first);
    println!("\nAvailability after both bookings");
    render_slots(&outcome.after);

    println!("\nA third request for the same day");
    render_attempt("client-late", &outcome.over_cap);

    let summary = &outcome.dispatch;
    println!(
        "\nNotification dispatch: processed {}, sent {}, failed {}, dead {}",
        summary.processed_count, summary.sent_count, summary.failed_count, summary.dead_count
    );
    for (job_id, to, client, time) in &outcome.delivered {
        println!("  {job_id} -> {to} ({client} at {time})");
    }

    Ok(())
}

/// Everything the demo prints, captured so the scenario can be asserted on.
pub(crate) struct DemoOutcome {
    pub(crate) initial: AvailabilityView,
    pub(crate) race: Vec<(String, Result<BookingReceipt, SchedulingError>)>,
    pub(crate) first: Result<BookingReceipt, SchedulingError>,
    pub(crate) after: AvailabilityView,
    pub(crate) over_cap: Result<BookingReceipt, SchedulingError>,
    pub(crate) dispatch: DispatchSummary,
    /// (job id, recipients, client, slot) for every job the dispatcher sent.
    pub(crate) delivered: Vec<(String, String, String, String)>,
}

pub(crate) async fn run_scenario(monday: NaiveDate) -> Result<DemoOutcome, AppError> {
    let today = monday - chrono::Duration::days(3);
    let store = Arc::new(InMemoryScheduleStore::from_snapshot(demo_schedule()?)?);
    let queue = Arc::new(InMemoryNotificationQueue::default());
    let service: Arc<DemoService> = Arc::new(ConsultationService::new(
        store,
        queue.clone(),
        BookingSettings {
            extra_recipients: vec!["frontdesk@example.com".to_string()],
            ..BookingSettings::default()
        },
        Arc::new(FixedClock {
            now: Utc::now(),
            today,
        }),
    ));
    let staff = StaffId("A".to_string());

    let initial = service.slots(&staff, monday)?;

    let late_slot = slot(9, 30, 10, 0)?;
    let handles: Vec<_> = ["client-north", "client-south"]
        .into_iter()
        .map(|client| {
            let service = Arc::clone(&service);
            let request = reservation(&staff, monday, late_slot, client);
            let handle = tokio::task::spawn_blocking(move || service.book(request));
            (client.to_string(), handle)
        })
        .collect();
    let mut race = Vec::with_capacity(handles.len());
    for (client, handle) in handles {
        let result = handle
            .await
            .map_err(|err| SchedulingError::StoreUnavailable(err.to_string()))?;
        race.push((client, result));
    }

    let first = service.book(reservation(
        &staff,
        monday,
        slot(9, 0, 9, 30)?,
        "client-morning",
    ));
    let after = service.slots(&staff, monday)?;
    let over_cap = service.book(reservation(
        &staff,
        monday,
        slot(9, 0, 9, 30)?,
        "client-late",
    ));

    let dispatcher = NotificationDispatcher::new(
        queue.clone(),
        Arc::new(LogMailSender),
        DispatchPolicy::default(),
    );
    let dispatch = dispatcher.run_once(Utc::now()).await;
    let delivered = queue
        .jobs(Some(JobState::Sent))
        .map_err(|err| SchedulingError::StoreUnavailable(err.to_string()))?
        .into_iter()
        .map(|job| {
            let client = job.details.get("client").cloned().unwrap_or_default();
            let time = job.details.get("time").cloned().unwrap_or_default();
            (job.id.0, job.recipients.join(", "), client, time)
        })
        .collect();

    Ok(DemoOutcome {
        initial,
        race,
        first,
        after,
        over_cap,
        dispatch,
        delivered,
    })
}

fn slot(
    start_hour: u32,
    start_minute: u32,
    end_hour: u32,
    end_minute: u32,
) -> Result<TimeRange, AppError> {
    let time = |hour: u32, minute: u32| {
        NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            SchedulingError::InvalidInput(format!("{hour:02}:{minute:02} is not a clock time"))
        })
    };
    TimeRange::new(time(start_hour, start_minute)?, time(end_hour, end_minute)?)
        .map_err(|err| AppError::Scheduling(SchedulingError::InvalidInput(err.to_string())))
}

fn reservation(
    staff: &StaffId,
    date: NaiveDate,
    slot: TimeRange,
    client: &str,
) -> ReservationRequest {
    ReservationRequest {
        staff_id: staff.clone(),
        date,
        slot,
        client_ref: client.to_string(),
    }
}

fn render_slots(view: &AvailabilityView) {
    if view.slots.is_empty() {
        println!("  {} has no consultation slots on {}", view.staff_id, view.date);
        return;
    }
    for slot in &view.slots {
        let marker = if slot.available { "open" } else { "taken" };
        println!("  {:<15} {}", slot.display_label, marker);
    }
}

fn render_attempt(client: &str, result: &Result<BookingReceipt, SchedulingError>) {
    match result {
        Ok(receipt) => println!(
            "  {client}: booked {} ({})",
            receipt.booking.time.label(),
            receipt.booking.id
        ),
        Err(err) => println!("  {client}: {} ({})", err.code(), err),
    }
}
