//! Order portal wire model and HTTP client.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::domain::PublishState;
use crate::error::DailyReadError;

pub const PROGRESS_REPORT_NAME: &str = "Project Progress";
const API_KEY_HEADER: &str = "X-OrderPortal-API-key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orderer {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub identifier: String,
    pub owner: Orderer,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reports: Vec<ReportRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub iuid: Option<String>,
    #[serde(default = "default_report_name")]
    pub name: String,
    pub status_label: String,
    pub state: ReportState,
    #[serde(default)]
    pub closed: Option<NaiveDate>,
}

fn default_report_name() -> String {
    PROGRESS_REPORT_NAME.to_string()
}

#[derive(Debug, Deserialize)]
struct OrderList {
    #[serde(default)]
    items: Vec<Order>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportUpload {
    pub order: String,
    pub name: String,
    pub filename: String,
    pub status: PublishState,
    pub file: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    iuid: String,
}

pub trait OrderPortalClient {
    /// Orders owned by `orderer`, in the portal's own order.
    fn orders_for(&self, orderer: &str) -> Result<Vec<Order>, DailyReadError>;
    /// Creates a report, or replaces `existing` when given. Returns the report iuid.
    fn upload_report(
        &self,
        upload: &ReportUpload,
        existing: Option<&str>,
    ) -> Result<String, DailyReadError>;
    fn delete_report(&self, iuid: &str) -> Result<(), DailyReadError>;
}

#[derive(Clone)]
pub struct OrderPortalHttpClient {
    client: Client,
    base_url: String,
}

impl OrderPortalHttpClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, DailyReadError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("daily-read/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DailyReadError::OrderPortalHttp(err.to_string()))?,
        );
        let mut key = HeaderValue::from_str(api_key.trim()).map_err(|_| {
            DailyReadError::Configuration("order portal API key is not a valid header value".to_string())
        })?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| DailyReadError::OrderPortalHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/api/v1/orders", self.base_url)
    }

    fn report_url(&self, iuid: Option<&str>) -> String {
        match iuid {
            Some(iuid) => format!("{}/api/v1/report/{iuid}", self.base_url),
            None => format!("{}/api/v1/report", self.base_url),
        }
    }
}

impl OrderPortalClient for OrderPortalHttpClient {
    fn orders_for(&self, orderer: &str) -> Result<Vec<Order>, DailyReadError> {
        let response = self
            .client
            .get(self.orders_url())
            .query(&[("orderer", orderer), ("fields", "report")])
            .send()
            .map_err(|err| DailyReadError::OrderPortalHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "order portal request failed".to_string());
            return Err(DailyReadError::OrderPortalStatus { status, message });
        }
        let list: OrderList = response
            .json()
            .map_err(|err| DailyReadError::OrderPortalHttp(err.to_string()))?;
        Ok(list.items)
    }

    fn upload_report(
        &self,
        upload: &ReportUpload,
        existing: Option<&str>,
    ) -> Result<String, DailyReadError> {
        let response = self
            .client
            .post(self.report_url(existing))
            .json(upload)
            .send()
            .map_err(|err| DailyReadError::OrderPortalHttp(err.to_string()))?;
        let response = upload_status(response)?;
        let body: UploadResponse = response
            .json()
            .map_err(|err| DailyReadError::Json(err.to_string()))?;
        Ok(body.iuid)
    }

    fn delete_report(&self, iuid: &str) -> Result<(), DailyReadError> {
        let response = self
            .client
            .delete(self.report_url(Some(iuid)))
            .send()
            .map_err(|err| DailyReadError::OrderPortalHttp(err.to_string()))?;
        upload_status(response).map(|_| ())
    }
}

fn upload_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, DailyReadError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "report upload failed".to_string());
    Err(DailyReadError::Upload { status, message })
}
