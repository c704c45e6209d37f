use std::fmt;

use camino::Utf8PathBuf;

use crate::domain::{DEFAULT_STATUS_PROGRESSION, StatusPriority};
use crate::error::DailyReadError;

pub const DATA_LOCATION: &str = "DAILY_READ_DATA_LOCATION";
pub const FETCH_FROM_NGIS: &str = "DAILY_READ_FETCH_FROM_NGIS";
pub const FETCH_FROM_SNPSEQ: &str = "DAILY_READ_FETCH_FROM_SNPSEQ";
pub const FETCH_FROM_UGC: &str = "DAILY_READ_FETCH_FROM_UGC";
pub const STHLM_STATUSDB_URL: &str = "DAILY_READ_STHLM_STATUSDB_URL";
pub const STHLM_STATUSDB_USERNAME: &str = "DAILY_READ_STHLM_STATUSDB_USERNAME";
pub const STHLM_STATUSDB_PASSWORD: &str = "DAILY_READ_STHLM_STATUSDB_PASSWORD";
pub const ORDER_PORTAL_URL: &str = "DAILY_READ_ORDER_PORTAL_URL";
pub const ORDER_PORTAL_API_KEY: &str = "DAILY_READ_ORDER_PORTAL_API_KEY";
pub const STATUS_PRIORITY: &str = "DAILY_READ_STATUS_PRIORITY";
pub const STATUSDB_LOOKBACK_MONTHS: &str = "DAILY_READ_STATUSDB_LOOKBACK_MONTHS";
pub const REPORT_REMOVAL_WINDOW_DAYS: &str = "DAILY_READ_REPORT_REMOVAL_WINDOW_DAYS";

pub const DEFAULT_LOOKBACK_MONTHS: u32 = 6;
pub const DEFAULT_REMOVAL_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FacilityFlags {
    pub ngis: bool,
    pub snpseq: bool,
    pub ugc: bool,
}

#[derive(Clone, PartialEq, Eq)]
pub struct StatusDbSettings {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for StatusDbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusDbSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"*********")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_location: Utf8PathBuf,
    pub facilities: FacilityFlags,
    pub statusdb: Option<StatusDbSettings>,
    pub order_portal_url: Option<String>,
    pub order_portal_api_key: Option<String>,
    pub status_priority: StatusPriority,
    pub statusdb_lookback_months: u32,
    pub report_removal_window_days: i64,
}

impl Config {
    /// Defaults for everything except the data location.
    pub fn new(data_location: impl Into<Utf8PathBuf>) -> Self {
        Self {
            data_location: data_location.into(),
            facilities: FacilityFlags::default(),
            statusdb: None,
            order_portal_url: None,
            order_portal_api_key: None,
            status_priority: StatusPriority::default(),
            statusdb_lookback_months: DEFAULT_LOOKBACK_MONTHS,
            report_removal_window_days: DEFAULT_REMOVAL_WINDOW_DAYS,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the process environment. Load `.env` beforehand if wanted.
    pub fn from_env() -> Result<Config, DailyReadError> {
        Self::resolve_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(lookup: F) -> Result<Config, DailyReadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let data_location = get(DATA_LOCATION).ok_or_else(|| {
            DailyReadError::Configuration(format!("environment variable {DATA_LOCATION} not set"))
        })?;

        let facilities = FacilityFlags {
            ngis: parse_flag(FETCH_FROM_NGIS, get(FETCH_FROM_NGIS))?,
            snpseq: parse_flag(FETCH_FROM_SNPSEQ, get(FETCH_FROM_SNPSEQ))?,
            ugc: parse_flag(FETCH_FROM_UGC, get(FETCH_FROM_UGC))?,
        };

        let statusdb = match (
            get(STHLM_STATUSDB_URL),
            get(STHLM_STATUSDB_USERNAME),
            get(STHLM_STATUSDB_PASSWORD),
        ) {
            (Some(url), Some(username), Some(password)) => Some(StatusDbSettings {
                url,
                username,
                password,
            }),
            (None, None, None) => None,
            _ => {
                return Err(DailyReadError::Configuration(format!(
                    "{STHLM_STATUSDB_URL}, {STHLM_STATUSDB_USERNAME} and {STHLM_STATUSDB_PASSWORD} must be set together"
                )));
            }
        };

        let status_priority = match get(STATUS_PRIORITY) {
            Some(value) => StatusPriority::from_progression(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|label| !label.is_empty()),
            ),
            None => StatusPriority::from_progression(DEFAULT_STATUS_PROGRESSION),
        };

        let statusdb_lookback_months = parse_number(
            STATUSDB_LOOKBACK_MONTHS,
            get(STATUSDB_LOOKBACK_MONTHS),
            DEFAULT_LOOKBACK_MONTHS,
        )?;
        let report_removal_window_days = parse_number(
            REPORT_REMOVAL_WINDOW_DAYS,
            get(REPORT_REMOVAL_WINDOW_DAYS),
            DEFAULT_REMOVAL_WINDOW_DAYS,
        )?;

        Ok(Config {
            data_location: Utf8PathBuf::from(data_location),
            facilities,
            statusdb,
            order_portal_url: get(ORDER_PORTAL_URL),
            order_portal_api_key: get(ORDER_PORTAL_API_KEY),
            status_priority,
            statusdb_lookback_months,
            report_removal_window_days,
        })
    }
}

fn parse_flag(key: &str, value: Option<String>) -> Result<bool, DailyReadError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DailyReadError::Configuration(format!(
            "{key} must be a boolean, got {value:?}"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
    default: T,
) -> Result<T, DailyReadError> {
    match value {
        Some(value) => value.parse().map_err(|_| {
            DailyReadError::Configuration(format!("{key} must be a number, got {value:?}"))
        }),
        None => Ok(default),
    }
}
