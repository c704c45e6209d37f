use std::fs;

use camino::Utf8PathBuf;

use crate::domain::ProjectRecord;
use crate::error::DailyReadError;

/// Supplies the rendered progress report for a project.
pub trait ReportSource {
    /// `Ok(None)` when no report has been produced for this project.
    fn report_for(
        &self,
        project: &ProjectRecord,
        status_label: &str,
    ) -> Result<Option<String>, DailyReadError>;
}

/// Reads `<root>/<portal_id>.html`.
#[derive(Debug, Clone)]
pub struct DirectoryReports {
    root: Utf8PathBuf,
}

impl DirectoryReports {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn report_path(&self, project: &ProjectRecord) -> Utf8PathBuf {
        self.root.join(format!("{}.html", project.project_id))
    }
}

impl ReportSource for DirectoryReports {
    fn report_for(
        &self,
        project: &ProjectRecord,
        _status_label: &str,
    ) -> Result<Option<String>, DailyReadError> {
        let path = self.report_path(project);
        if !path.as_std_path().is_file() {
            return Ok(None);
        }
        fs::read_to_string(path.as_std_path())
            .map(Some)
            .map_err(|err| DailyReadError::Filesystem(format!("read {path}: {err}")))
    }
}
