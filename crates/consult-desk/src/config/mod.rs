use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;

use crate::workflows::consultation::BookingSettings;
use crate::workflows::notifications::{BackoffPolicy, DispatchPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scheduling: SchedulingConfig,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let raw_offset = env::var("SCHEDULE_UTC_OFFSET").unwrap_or_else(|_| "+00:00".to_string());
        let utc_offset = parse_utc_offset(&raw_offset)
            .ok_or(ConfigError::InvalidUtcOffset { value: raw_offset })?;
        let schedule_csv = env::var("SCHEDULE_CSV")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let scheduling = SchedulingConfig {
            utc_offset,
            schedule_csv,
            lock_timeout: Duration::from_millis(positive_var("BOOKING_LOCK_TIMEOUT_MS", 2_000)?),
        };

        let notifications = NotificationConfig {
            max_attempts: positive_var("NOTIFY_MAX_ATTEMPTS", 3)?,
            batch_size: positive_var("NOTIFY_BATCH_SIZE", 10)?,
            poll_interval: Duration::from_secs(positive_var("NOTIFY_POLL_INTERVAL_SECS", 15)?),
            send_timeout: Duration::from_secs(positive_var("NOTIFY_SEND_TIMEOUT_SECS", 10)?),
            backoff_base: Duration::from_secs(positive_var("NOTIFY_BACKOFF_BASE_SECS", 30)?),
            backoff_cap: Duration::from_secs(positive_var("NOTIFY_BACKOFF_CAP_SECS", 3_600)?),
            stale_after: Duration::from_secs(positive_var("NOTIFY_STALE_AFTER_SECS", 300)?),
            cc: split_recipients(&env::var("NOTIFY_CC").unwrap_or_default()),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scheduling,
            notifications,
        })
    }

    pub fn booking_settings(&self) -> BookingSettings {
        BookingSettings {
            lock_timeout: self.scheduling.lock_timeout,
            extra_recipients: self.notifications.cc.clone(),
        }
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Calendar settings. Every schedule date and time is interpreted in `utc_offset`.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub utc_offset: FixedOffset,
    pub schedule_csv: Option<PathBuf>,
    pub lock_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub max_attempts: u32,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub send_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub stale_after: Duration,
    pub cc: Vec<String>,
}

impl NotificationConfig {
    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            batch_size: self.batch_size,
            send_timeout: self.send_timeout,
            poll_interval: self.poll_interval,
            stale_after: self.stale_after,
            backoff: BackoffPolicy {
                base: self.backoff_base,
                cap: self.backoff_cap.max(self.backoff_base),
            },
        }
    }
}

fn positive_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidNumber { key, value: raw }),
    }
}

/// Accepts `Z`, `+HH:MM`, `-HH:MM`, or the colon-less `+HHMM`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match trimmed.as_bytes().first()? {
        b'+' => (1, &trimmed[1..]),
        b'-' => (-1, &trimmed[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some(parts) => parts,
        None if rest.len() == 4 && rest.is_ascii() => rest.split_at(2),
        None => return None,
    };
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }

    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3_600 + minutes * 60))
}

fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidUtcOffset { value: String },
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUtcOffset { value } => {
                write!(f, "SCHEDULE_UTC_OFFSET '{value}' must look like +HH:MM or -HH:MM")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive integer, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidUtcOffset { .. }
            | ConfigError::InvalidNumber { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const VARS: &[&str] = &[
        "APP_ENV",
        "APP_HOST",
        "APP_PORT",
        "APP_LOG_LEVEL",
        "SCHEDULE_UTC_OFFSET",
        "SCHEDULE_CSV",
        "BOOKING_LOCK_TIMEOUT_MS",
        "NOTIFY_MAX_ATTEMPTS",
        "NOTIFY_BATCH_SIZE",
        "NOTIFY_POLL_INTERVAL_SECS",
        "NOTIFY_SEND_TIMEOUT_SECS",
        "NOTIFY_BACKOFF_BASE_SECS",
        "NOTIFY_BACKOFF_CAP_SECS",
        "NOTIFY_STALE_AFTER_SECS",
        "NOTIFY_CC",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in VARS {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.scheduling.utc_offset.local_minus_utc(), 0);
        assert!(config.scheduling.schedule_csv.is_none());
        assert_eq!(config.scheduling.lock_timeout, Duration::from_secs(2));
        assert_eq!(config.notifications.max_attempts, 3);
        assert_eq!(
            config.notifications.dispatch_policy(),
            DispatchPolicy::default()
        );
        assert!(config.notifications.cc.is_empty());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn reads_scheduling_and_notification_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCHEDULE_UTC_OFFSET", "-05:30");
        env::set_var("SCHEDULE_CSV", "fixtures/schedule.csv");
        env::set_var("NOTIFY_MAX_ATTEMPTS", "5");
        env::set_var("NOTIFY_CC", "desk@example.com, ,ops@example.com");
        let config = AppConfig::load().expect("config loads");
        reset_env();

        assert_eq!(
            config.scheduling.utc_offset.local_minus_utc(),
            -(5 * 3_600 + 30 * 60)
        );
        assert_eq!(
            config.scheduling.schedule_csv,
            Some(PathBuf::from("fixtures/schedule.csv"))
        );
        assert_eq!(config.notifications.max_attempts, 5);
        assert_eq!(
            config.booking_settings().extra_recipients,
            vec!["desk@example.com".to_string(), "ops@example.com".to_string()]
        );
    }

    #[test]
    fn rejects_zero_and_garbage_numbers() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("NOTIFY_BATCH_SIZE", "0");
        let zero = AppConfig::load();
        reset_env();
        env::set_var("NOTIFY_SEND_TIMEOUT_SECS", "soon");
        let garbage = AppConfig::load();
        reset_env();

        assert!(matches!(
            zero,
            Err(ConfigError::InvalidNumber { key: "NOTIFY_BATCH_SIZE", .. })
        ));
        assert!(matches!(
            garbage,
            Err(ConfigError::InvalidNumber { key: "NOTIFY_SEND_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn utc_offsets_parse_in_common_shapes() {
        assert_eq!(parse_utc_offset("Z").map(|o| o.local_minus_utc()), Some(0));
        assert_eq!(
            parse_utc_offset("+0200").map(|o| o.local_minus_utc()),
            Some(7_200)
        );
        assert_eq!(
            parse_utc_offset(" -03:00 ").map(|o| o.local_minus_utc()),
            Some(-10_800)
        );
        assert!(parse_utc_offset("02:00").is_none());
        assert!(parse_utc_offset("+24:00").is_none());
        assert!(parse_utc_offset("+1:00").is_none());
    }
}
