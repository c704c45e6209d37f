use std::collections::BTreeSet;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DailyReadError;

/// One project as stored under `<node>/<year>/<portal_id>.json`.
///
/// A record built from a bare path carries identity only; its payload is
/// loaded from the store on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub project_id: String,
    pub ngi_node: String,
    pub year: String,
    pub file_name: String,
    pub relative_path: Utf8PathBuf,
    pub relative_dirpath: Utf8PathBuf,
    pub orderer: Option<String>,
    pub data: Option<Value>,
    pub report_iuid: Option<String>,
}

impl ProjectRecord {
    pub fn new(
        relative_path: impl Into<Utf8PathBuf>,
        data: Option<Value>,
    ) -> Result<Self, DailyReadError> {
        let mut record = Self::from_path(relative_path)?;
        if let Some(data) = data {
            record.set_data(data)?;
        }
        Ok(record)
    }

    pub fn from_path(relative_path: impl Into<Utf8PathBuf>) -> Result<Self, DailyReadError> {
        let relative_path = relative_path.into();
        let parts = relative_path
            .components()
            .map(|component| component.as_str())
            .collect::<Vec<_>>();
        let [node, year, file_name] = parts.as_slice() else {
            return Err(DailyReadError::Validation(format!(
                "project path must look like <node>/<year>/<file>: {relative_path}"
            )));
        };

        Ok(Self {
            project_id: portal_id_from_path(&relative_path),
            ngi_node: node.to_string(),
            year: year.to_string(),
            file_name: file_name.to_string(),
            relative_dirpath: Utf8PathBuf::from(*node).join(year),
            relative_path,
            orderer: None,
            data: None,
            report_iuid: None,
        })
    }

    /// Attaches a payload, which must name its orderer.
    pub fn set_data(&mut self, data: Value) -> Result<(), DailyReadError> {
        let orderer = data
            .get("orderer")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                DailyReadError::Validation(format!(
                    "Orderer missing for project_id: {}, NGI node: {}",
                    self.project_id, self.ngi_node
                ))
            })?;
        self.orderer = Some(orderer.to_string());
        self.data = Some(data);
        Ok(())
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Every status label listed under `proj_dates`, regardless of date.
    pub fn reached_statuses(&self) -> BTreeSet<String> {
        self.data
            .as_ref()
            .and_then(|data| data.get("proj_dates"))
            .and_then(|dates| dates.as_object())
            .map(|dates| {
                dates
                    .values()
                    .filter_map(|labels| labels.as_array())
                    .flatten()
                    .filter_map(|label| label.as_str())
                    .map(|label| label.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Filename without its final extension, e.g. `NGIS/2023/NGI0002313.json` -> `NGI0002313`.
pub fn portal_id_from_path(path: &Utf8Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .unwrap_or_default()
        .to_string()
}

pub const DEFAULT_STATUS_PROGRESSION: [&str; 5] = [
    "Samples Received",
    "Reception Control finished",
    "Library QC finished",
    "All Samples Sequenced",
    "All Raw data Delivered",
];

/// Status labels ranked highest priority first.
///
/// Labels missing from the ranking sort after every ranked label, and
/// lexically among themselves, so any two labels compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPriority {
    ranked: Vec<String>,
}

impl StatusPriority {
    /// Builds a ranking from labels in the order a project progresses through them.
    pub fn from_progression<I, S>(progression: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ranked = progression.into_iter().map(Into::into).collect::<Vec<_>>();
        ranked.reverse();
        Self { ranked }
    }

    pub fn ranked(&self) -> &[String] {
        &self.ranked
    }

    pub fn rank(&self, label: &str) -> Option<usize> {
        self.ranked.iter().position(|ranked| ranked == label)
    }

    /// Highest-priority label among `candidates`, if any.
    pub fn best<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .min_by_key(|label| (self.rank(label).unwrap_or(usize::MAX), *label))
    }
}

impl Default for StatusPriority {
    fn default() -> Self {
        Self::from_progression(DEFAULT_STATUS_PROGRESSION)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PublishState {
    Published,
    Review,
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishState::Published => write!(f, "published"),
            PublishState::Review => write!(f, "review"),
        }
    }
}
