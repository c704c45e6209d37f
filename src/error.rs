use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DailyReadError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("report upload failed with status {status}: {message}")]
    Upload { status: u16, message: String },

    #[error("status database request failed: {0}")]
    StatusDbHttp(String),

    #[error("status database returned status {status}: {message}")]
    StatusDbStatus { status: u16, message: String },

    #[error("order portal request failed: {0}")]
    OrderPortalHttp(String),

    #[error("order portal returned status {status}: {message}")]
    OrderPortalStatus { status: u16, message: String },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to (de)serialize JSON: {0}")]
    Json(String),

    #[error("{0}")]
    ErrorsLogged(String),
}

impl DailyReadError {
    /// True for failures caused by talking to a remote service.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            DailyReadError::Upload { .. }
                | DailyReadError::StatusDbHttp(_)
                | DailyReadError::StatusDbStatus { .. }
                | DailyReadError::OrderPortalHttp(_)
                | DailyReadError::OrderPortalStatus { .. }
        )
    }
}
