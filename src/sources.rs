//! Facility adapters.
//!
//! Each facility is a [`ProjectSource`]. Only NGI Stockholm is backed by a
//! real database; the other facilities are kept as explicit empty sources so
//! they can be enabled, listed and replaced without touching the caller.

use std::collections::BTreeMap;

use chrono::{Datelike, Local, Months, NaiveDate};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{Config, FacilityFlags};
use crate::domain::ProjectRecord;
use crate::error::DailyReadError;
use crate::statusdb::StatusDbClient;

pub type ProjectMap = BTreeMap<String, ProjectRecord>;

pub trait ProjectSource {
    /// Display name, used in logs.
    fn name(&self) -> &str;
    /// Top-level directory of this facility in the data location.
    fn dirname(&self) -> &str;
    /// Records keyed by portal id. `project_id` narrows the fetch to one project.
    fn get_data(&self, project_id: Option<&str>) -> Result<ProjectMap, DailyReadError>;
}

pub struct StockholmSource<C: StatusDbClient> {
    client: C,
    lookback_months: u32,
}

impl<C: StatusDbClient> StockholmSource<C> {
    pub const NAME: &'static str = "NGI Stockholm";
    pub const DIRNAME: &'static str = "NGIS";

    pub fn new(client: C, lookback_months: u32) -> Self {
        Self {
            client,
            lookback_months,
        }
    }

    fn close_date(&self, today: NaiveDate) -> String {
        today
            .checked_sub_months(Months::new(self.lookback_months))
            .unwrap_or(NaiveDate::MIN)
            .format("%Y-%m-%d")
            .to_string()
    }

    fn record_from_row(&self, value: Value, today: NaiveDate) -> Result<ProjectRecord, DailyReadError> {
        let portal_id = value
            .get("portal_id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| {
                DailyReadError::Validation(format!(
                    "status database row without portal_id from {}",
                    Self::NAME
                ))
            })?
            .to_string();
        let year = order_year(&value).unwrap_or_else(|| today.year().to_string());
        ProjectRecord::new(
            format!("{}/{year}/{portal_id}.json", Self::DIRNAME),
            Some(value),
        )
    }
}

impl<C: StatusDbClient> ProjectSource for StockholmSource<C> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dirname(&self) -> &str {
        Self::DIRNAME
    }

    fn get_data(&self, project_id: Option<&str>) -> Result<ProjectMap, DailyReadError> {
        let today = Local::now().date_naive();
        let close_date = self.close_date(today);
        debug!("Fetching {} projects closed after {close_date}", Self::NAME);

        let mut data = ProjectMap::new();
        for row in self.client.rows(&close_date)? {
            let record = self.record_from_row(row.value, today)?;
            if project_id.is_some_and(|wanted| wanted != record.project_id) {
                continue;
            }
            data.insert(record.project_id.clone(), record);
        }
        info!("Fetched {} projects from {}", data.len(), Self::NAME);
        Ok(data)
    }
}

/// `order_year` if present, otherwise the year of the earliest status date.
fn order_year(value: &Value) -> Option<String> {
    match value.get("order_year") {
        Some(Value::String(year)) if !year.is_empty() => return Some(year.clone()),
        Some(Value::Number(year)) => return Some(year.to_string()),
        _ => {}
    }
    value
        .get("proj_dates")
        .and_then(|dates| dates.as_object())
        .and_then(|dates| {
            dates
                .keys()
                .filter_map(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
                .min()
        })
        .map(|date| date.year().to_string())
}

#[derive(Debug, Default)]
pub struct SnpseqSource;

impl SnpseqSource {
    pub const NAME: &'static str = "SNP&SEQ";
    pub const DIRNAME: &'static str = "SNPSEQ";
}

impl ProjectSource for SnpseqSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dirname(&self) -> &str {
        Self::DIRNAME
    }

    fn get_data(&self, _project_id: Option<&str>) -> Result<ProjectMap, DailyReadError> {
        debug!("{} has no data source yet", Self::NAME);
        Ok(ProjectMap::new())
    }
}

#[derive(Debug, Default)]
pub struct UgcSource;

impl UgcSource {
    pub const NAME: &'static str = "Uppsala Genome Center";
    pub const DIRNAME: &'static str = "UGC";
}

impl ProjectSource for UgcSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dirname(&self) -> &str {
        Self::DIRNAME
    }

    fn get_data(&self, _project_id: Option<&str>) -> Result<ProjectMap, DailyReadError> {
        debug!("{} has no data source yet", Self::NAME);
        Ok(ProjectMap::new())
    }
}

/// Builds the enabled sources, in a fixed order.
///
/// `make_statusdb` is only called when Stockholm is enabled.
pub fn build_sources<C, F>(
    flags: FacilityFlags,
    lookback_months: u32,
    make_statusdb: F,
) -> Result<Vec<Box<dyn ProjectSource>>, DailyReadError>
where
    C: StatusDbClient + 'static,
    F: FnOnce() -> Result<C, DailyReadError>,
{
    let mut sources: Vec<Box<dyn ProjectSource>> = Vec::new();
    if flags.ngis {
        sources.push(Box::new(StockholmSource::new(
            make_statusdb()?,
            lookback_months,
        )));
    }
    if flags.snpseq {
        sources.push(Box::new(SnpseqSource));
    }
    if flags.ugc {
        sources.push(Box::new(UgcSource));
    }
    Ok(sources)
}

/// Sources for `config`, with Stockholm talking to CouchDB over HTTP.
pub fn sources_from_config(config: &Config) -> Result<Vec<Box<dyn ProjectSource>>, DailyReadError> {
    build_sources(config.facilities, config.statusdb_lookback_months, || {
        let settings = config.statusdb.clone().ok_or_else(|| {
            DailyReadError::Configuration(
                "fetching from NGI Stockholm requires the status database settings".to_string(),
            )
        })?;
        crate::statusdb::CouchDbClient::new(settings)
    })
}
