//! Matching changed projects against their orders in the order portal.

use std::collections::{BTreeMap, HashSet};

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::{ProjectRecord, PublishState, StatusPriority};
use crate::error::DailyReadError;
use crate::order_portal::{
    Order, OrderPortalClient, PROGRESS_REPORT_NAME, ReportRequest, ReportState, ReportUpload,
};

/// Report work for one orderer, keyed by status label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifiedOrders {
    /// Projects that need a new or updated progress report.
    pub projects: BTreeMap<String, Vec<ProjectRecord>>,
    /// Projects whose report should be removed.
    pub delete_report_for: BTreeMap<String, Vec<ProjectRecord>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileCounts {
    pub upload: usize,
    pub delete: usize,
}

pub struct OrderReconciler<'a, C: OrderPortalClient> {
    client: &'a C,
    projects: BTreeMap<String, ProjectRecord>,
    removal_window_days: i64,
    all_orders: Vec<Order>,
    modified_orders: BTreeMap<String, ModifiedOrders>,
}

impl<'a, C: OrderPortalClient> OrderReconciler<'a, C> {
    /// `projects` are the changed projects to look for among the orders.
    pub fn new<I>(config: &Config, client: &'a C, projects: I) -> Result<Self, DailyReadError>
    where
        I: IntoIterator<Item = ProjectRecord>,
    {
        if config.order_portal_url.is_none() {
            error!("environment variable DAILY_READ_ORDER_PORTAL_URL not set");
            return Err(DailyReadError::Configuration(
                "environment variable DAILY_READ_ORDER_PORTAL_URL not set".to_string(),
            ));
        }
        if config.order_portal_api_key.is_none() {
            error!("environment variable DAILY_READ_ORDER_PORTAL_API_KEY not set");
            return Err(DailyReadError::Configuration(
                "environment variable DAILY_READ_ORDER_PORTAL_API_KEY not set".to_string(),
            ));
        }

        Ok(Self {
            client,
            projects: projects
                .into_iter()
                .map(|project| (project.project_id.clone(), project))
                .collect(),
            removal_window_days: config.report_removal_window_days,
            all_orders: Vec::new(),
            modified_orders: BTreeMap::new(),
        })
    }

    pub fn all_orders(&self) -> &[Order] {
        &self.all_orders
    }

    pub fn modified_orders(&self) -> &BTreeMap<String, ModifiedOrders> {
        &self.modified_orders
    }

    pub fn get_orders(&mut self, orderer: &str) -> Result<(), DailyReadError> {
        match self.client.orders_for(orderer) {
            Ok(orders) => {
                debug!("Fetched {} orders for {orderer}", orders.len());
                self.all_orders = orders;
                Ok(())
            }
            Err(err) => {
                error!("Failed to fetch orders for {orderer}: {err}");
                Err(err)
            }
        }
    }

    pub fn process_orders(
        &mut self,
        priority: &StatusPriority,
    ) -> Result<&BTreeMap<String, ModifiedOrders>, DailyReadError> {
        self.process_orders_on(priority, Local::now().date_naive())
    }

    /// Sorts the fetched orders into report uploads and report removals.
    ///
    /// Results accumulate across calls, one entry per orderer.
    pub fn process_orders_on(
        &mut self,
        priority: &StatusPriority,
        today: NaiveDate,
    ) -> Result<&BTreeMap<String, ModifiedOrders>, DailyReadError> {
        for order in &self.all_orders {
            let Some(project) = self.projects.get(&order.identifier) else {
                continue;
            };
            ensure_unambiguous(order)?;

            let progress = order
                .reports
                .iter()
                .filter(|request| request.name == PROGRESS_REPORT_NAME)
                .collect::<Vec<_>>();
            let reached = project.reached_statuses();

            let open = progress
                .iter()
                .copied()
                .filter(|request| request.state == ReportState::Open)
                .filter(|request| reached.contains(&request.status_label));
            let upload = highest_ranked(priority, open);

            let window = self.removal_window_days;
            let closed = progress
                .iter()
                .copied()
                .filter(|request| request.state == ReportState::Closed)
                .filter(|request| closed_within(request.closed, today, window));
            let removal = highest_ranked(priority, closed);

            if upload.is_none() && removal.is_none() {
                debug!("Nothing to report for order {}", order.identifier);
                continue;
            }

            let entry = self
                .modified_orders
                .entry(order.owner.email.clone())
                .or_default();
            if let Some(request) = upload {
                push_unique(&mut entry.projects, request, project);
            }
            if let Some(request) = removal {
                push_unique(&mut entry.delete_report_for, request, project);
            }
        }
        Ok(&self.modified_orders)
    }

    pub fn counts(&self) -> ReconcileCounts {
        let mut counts = ReconcileCounts::default();
        for orders in self.modified_orders.values() {
            counts.upload += orders.projects.values().map(Vec::len).sum::<usize>();
            counts.delete += orders.delete_report_for.values().map(Vec::len).sum::<usize>();
        }
        counts
    }

    /// Sends the report for `project`, replacing its existing report if it has one.
    ///
    /// Returns the report iuid; storing it on the record is up to the caller.
    pub fn upload_report_to_order_portal(
        &self,
        report_html: &str,
        project: &ProjectRecord,
        publish_state: PublishState,
    ) -> Result<String, DailyReadError> {
        let upload = ReportUpload {
            order: project.project_id.clone(),
            name: PROGRESS_REPORT_NAME.to_string(),
            filename: format!("{}_progress_report.html", project.project_id),
            status: publish_state,
            file: report_html.to_string(),
        };
        match self
            .client
            .upload_report(&upload, project.report_iuid.as_deref())
        {
            Ok(iuid) => {
                info!(
                    "Report {iuid} {publish_state} for order with project id {}",
                    project.project_id
                );
                Ok(iuid)
            }
            Err(err) => {
                error!(
                    "Report not uploaded for order with project id {}: {err}",
                    project.project_id
                );
                Err(err)
            }
        }
    }

    /// Removes the project's report. Returns false if it has none to remove.
    pub fn delete_report_from_order_portal(
        &self,
        project: &ProjectRecord,
    ) -> Result<bool, DailyReadError> {
        let Some(iuid) = project.report_iuid.as_deref() else {
            warn!(
                "No report registered for order with project id {}, nothing to delete",
                project.project_id
            );
            return Ok(false);
        };
        match self.client.delete_report(iuid) {
            Ok(()) => {
                info!("Report {iuid} deleted for project id {}", project.project_id);
                Ok(true)
            }
            Err(err) => {
                error!(
                    "Report {iuid} not deleted for project id {}: {err}",
                    project.project_id
                );
                Err(err)
            }
        }
    }
}

fn ensure_unambiguous(order: &Order) -> Result<(), DailyReadError> {
    let mut seen = HashSet::new();
    for request in &order.reports {
        if !seen.insert((request.name.as_str(), request.status_label.as_str())) {
            let message = format!(
                "Multiple reports for {} found in the Order Portal for order {}",
                request.name, order.identifier
            );
            error!("{message}");
            return Err(DailyReadError::Validation(message));
        }
    }
    Ok(())
}

fn highest_ranked<'r, I>(priority: &StatusPriority, requests: I) -> Option<&'r ReportRequest>
where
    I: Iterator<Item = &'r ReportRequest>,
{
    let requests = requests.collect::<Vec<_>>();
    let label = priority.best(
        requests
            .iter()
            .copied()
            .map(|request| request.status_label.as_str()),
    )?;
    requests
        .into_iter()
        .find(|request| request.status_label == label)
}

/// Closed on a date between `today - window_days` and `today`, inclusive.
fn closed_within(closed: Option<NaiveDate>, today: NaiveDate, window_days: i64) -> bool {
    let Some(closed) = closed else {
        return false;
    };
    let age = (today - closed).num_days();
    (0..=window_days).contains(&age)
}

fn push_unique(
    buckets: &mut BTreeMap<String, Vec<ProjectRecord>>,
    request: &ReportRequest,
    project: &ProjectRecord,
) {
    let bucket = buckets.entry(request.status_label.clone()).or_default();
    if bucket
        .iter()
        .any(|staged| staged.project_id == project.project_id)
    {
        return;
    }
    let mut staged = project.clone();
    staged.report_iuid = request.iuid.clone().or_else(|| project.report_iuid.clone());
    bucket.push(staged);
}
