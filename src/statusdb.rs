use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::config::StatusDbSettings;
use crate::error::DailyReadError;

const PROJECTS_DB: &str = "projects";
const DAILY_READ_VIEW: &str = "_design/project/_view/dailyread_dates";

#[derive(Debug, Clone, Deserialize)]
pub struct ViewRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    rows: Vec<ViewRow>,
}

pub trait StatusDbClient {
    /// Project rows closed on or after `close_date` (or still open), newest first.
    fn rows(&self, close_date: &str) -> Result<Vec<ViewRow>, DailyReadError>;
}

pub struct CouchDbClient {
    client: Client,
    settings: StatusDbSettings,
}

impl CouchDbClient {
    /// Connects and probes the server so bad credentials fail at startup.
    pub fn new(settings: StatusDbSettings) -> Result<Self, DailyReadError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("daily-read/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DailyReadError::StatusDbHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| DailyReadError::StatusDbHttp(err.to_string()))?;

        let db = Self { client, settings };
        db.probe()?;
        Ok(db)
    }

    fn display_url(&self) -> String {
        format!(
            "{} (user {}, password *********)",
            self.settings.url, self.settings.username
        )
    }

    fn probe(&self) -> Result<(), DailyReadError> {
        let response = self
            .client
            .get(&self.settings.url)
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .send()
            .map_err(|err| {
                DailyReadError::StatusDbHttp(format!(
                    "Couchdb connection failed for url {} with error {err}",
                    self.display_url()
                ))
            })?;
        Self::handle_status(response).map(|_| ())
    }

    fn view_url(&self) -> String {
        format!(
            "{}/{PROJECTS_DB}/{DAILY_READ_VIEW}",
            self.settings.url.trim_end_matches('/')
        )
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, DailyReadError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "status database request failed".to_string());
        Err(DailyReadError::StatusDbStatus { status, message })
    }
}

impl StatusDbClient for CouchDbClient {
    fn rows(&self, close_date: &str) -> Result<Vec<ViewRow>, DailyReadError> {
        let end_key = serde_json::to_string(&[close_date, "ZZZZ"])
            .map_err(|err| DailyReadError::Json(err.to_string()))?;
        let response = self
            .client
            .get(self.view_url())
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .query(&[("descending", "true"), ("end_key", end_key.as_str())])
            .send()
            .map_err(|err| DailyReadError::StatusDbHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let view: ViewResponse = response
            .json()
            .map_err(|err| DailyReadError::StatusDbHttp(err.to_string()))?;
        Ok(view.rows)
    }
}
