use serde::Serialize;
use tracing::{error, info};

use crate::config::Config;
use crate::domain::{ProjectRecord, PublishState};
use crate::error::DailyReadError;
use crate::master::DataMaster;
use crate::order_portal::OrderPortalClient;
use crate::reconcile::OrderReconciler;
use crate::reports::ReportSource;

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub upload: bool,
    pub publish_state: PublishState,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            upload: false,
            publish_state: PublishState::Published,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub ngi_node: String,
    pub year: String,
    pub orderer: Option<String>,
    pub path: String,
}

impl From<&ProjectRecord> for ProjectSummary {
    fn from(record: &ProjectRecord) -> Self {
        Self {
            project_id: record.project_id.clone(),
            ngi_node: record.ngi_node.clone(),
            year: record.year.clone(),
            orderer: record.orderer.clone(),
            path: record.relative_path.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub sources: Vec<String>,
    pub fetched: usize,
    pub modified_or_new: Vec<ProjectSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportActionKind {
    Upload,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportOutcome {
    Planned,
    Uploaded,
    Deleted,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportAction {
    pub orderer: String,
    pub project_id: String,
    pub status_label: String,
    pub action: ReportActionKind,
    pub outcome: ReportOutcome,
    pub report_iuid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResult {
    pub fetched: usize,
    pub modified_or_new: Vec<ProjectSummary>,
    pub orderers: Vec<String>,
    pub actions: Vec<ReportAction>,
    pub committed: Option<String>,
}

/// Fetches and saves all sources, leaving the changes uncommitted.
pub fn fetch(master: &mut DataMaster) -> Result<FetchResult, DailyReadError> {
    master.get_data()?;
    master.save_data()?;
    let changed = master.modified_or_new_projects()?;
    Ok(FetchResult {
        sources: master
            .source_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        fetched: master.records().len(),
        modified_or_new: changed.iter().map(ProjectSummary::from).collect(),
    })
}

pub struct App<P: OrderPortalClient, R: ReportSource> {
    config: Config,
    portal: P,
    reports: R,
}

impl<P: OrderPortalClient, R: ReportSource> App<P, R> {
    pub fn new(config: Config, portal: P, reports: R) -> Self {
        Self {
            config,
            portal,
            reports,
        }
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn fetch(&self, master: &mut DataMaster) -> Result<FetchResult, DailyReadError> {
        fetch(master)
    }

    /// The full run: fetch, find changed projects, match them to orders and
    /// (with `upload`) publish or remove reports, committing what was handled.
    ///
    /// Failed uploads and missing reports are logged and skipped so the rest
    /// of the run still completes.
    pub fn generate(
        &self,
        master: &mut DataMaster,
        options: &GenerateOptions,
    ) -> Result<GenerateResult, DailyReadError> {
        master.get_data()?;
        master.save_data()?;
        let changed = master.modified_or_new_projects()?;

        let mut result = GenerateResult {
            fetched: master.records().len(),
            modified_or_new: changed.iter().map(ProjectSummary::from).collect(),
            orderers: Vec::new(),
            actions: Vec::new(),
            committed: None,
        };
        if changed.is_empty() {
            info!("No modified or new projects, nothing to report");
            return Ok(result);
        }

        let mut projects = Vec::with_capacity(changed.len());
        for record in changed {
            if record.has_data() {
                projects.push(record);
            } else if master.store().exists(&record) {
                projects.push(master.load_payload(&record)?);
            } else {
                info!(
                    "{} from {} was removed from the data location",
                    record.project_id, record.ngi_node
                );
            }
        }

        let orderers = DataMaster::unique_orderers(&projects);
        result.orderers = orderers.iter().cloned().collect();

        let mut reconciler = OrderReconciler::new(&self.config, &self.portal, projects)?;
        for orderer in &orderers {
            reconciler.get_orders(orderer)?;
            reconciler.process_orders(&self.config.status_priority)?;
        }
        let counts = reconciler.counts();
        info!(
            "{} reports to upload and {} to delete for {} orderers",
            counts.upload,
            counts.delete,
            orderers.len()
        );

        let modified_orders = reconciler.modified_orders().clone();
        for (orderer, orders) in &modified_orders {
            for (label, projects) in &orders.projects {
                for project in projects {
                    let mut action = ReportAction {
                        orderer: orderer.clone(),
                        project_id: project.project_id.clone(),
                        status_label: label.clone(),
                        action: ReportActionKind::Upload,
                        outcome: ReportOutcome::Planned,
                        report_iuid: project.report_iuid.clone(),
                    };
                    if options.upload {
                        let outcome =
                            self.upload(master, &reconciler, project, label, options, &mut action)?;
                        action.outcome = outcome;
                    }
                    result.actions.push(action);
                }
            }

            for (label, projects) in &orders.delete_report_for {
                for project in projects {
                    let mut action = ReportAction {
                        orderer: orderer.clone(),
                        project_id: project.project_id.clone(),
                        status_label: label.clone(),
                        action: ReportActionKind::Delete,
                        outcome: ReportOutcome::Planned,
                        report_iuid: project.report_iuid.clone(),
                    };
                    if options.upload {
                        action.outcome = match reconciler.delete_report_from_order_portal(project) {
                            Ok(true) => {
                                let mut updated = project.clone();
                                updated.report_iuid = None;
                                master.stage(&updated)?;
                                master.insert_record(updated);
                                ReportOutcome::Deleted
                            }
                            Ok(false) => ReportOutcome::Skipped,
                            Err(_) => ReportOutcome::Failed,
                        };
                    }
                    result.actions.push(action);
                }
            }
        }

        if options.upload && !master.store().staged_changes()?.is_empty() {
            let handled = result
                .actions
                .iter()
                .filter(|action| {
                    matches!(
                        action.outcome,
                        ReportOutcome::Uploaded | ReportOutcome::Deleted
                    )
                })
                .count();
            let oid = master.commit(&format!("Reports updated for {handled} projects"))?;
            result.committed = Some(oid.to_string());
        }
        Ok(result)
    }

    fn upload(
        &self,
        master: &mut DataMaster,
        reconciler: &OrderReconciler<'_, P>,
        project: &ProjectRecord,
        label: &str,
        options: &GenerateOptions,
        action: &mut ReportAction,
    ) -> Result<ReportOutcome, DailyReadError> {
        let Some(report) = self.reports.report_for(project, label)? else {
            error!(
                "No report available for project {} ({label}), not uploaded",
                project.project_id
            );
            return Ok(ReportOutcome::Skipped);
        };
        let Ok(iuid) =
            reconciler.upload_report_to_order_portal(&report, project, options.publish_state)
        else {
            return Ok(ReportOutcome::Failed);
        };

        let mut updated = project.clone();
        updated.report_iuid = Some(iuid.clone());
        master.stage(&updated)?;
        master.insert_record(updated);
        action.report_iuid = Some(iuid);
        Ok(ReportOutcome::Uploaded)
    }
}
