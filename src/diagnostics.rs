//! Run-scoped collection of error-level log messages.
//!
//! A run keeps going past errors it can contain (a missing report, say) and
//! fails once at the end if anything was logged at ERROR level.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::error::DailyReadError;

const SUMMARY_HEADER: &str = "Errors logged in DailyRead during execution";

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    errors: Arc<Mutex<Vec<String>>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A layer feeding this collector; install it next to the fmt layer.
    pub fn layer(&self) -> ErrorCollectorLayer {
        ErrorCollectorLayer {
            diagnostics: self.clone(),
        }
    }

    /// Stderr logging limited by `filter`, plus this collector.
    ///
    /// The filter applies to the fmt layer only; the collector sees every
    /// ERROR event whatever the log level.
    pub fn subscriber(&self, filter: EnvFilter) -> impl Subscriber + Send + Sync + use<> {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .with(self.layer())
    }

    pub fn record(&self, message: impl Into<String>) {
        self.lock().push(message.into());
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn finish(&self) -> Result<(), DailyReadError> {
        let errors = self.lock();
        if errors.is_empty() {
            return Ok(());
        }
        Err(DailyReadError::ErrorsLogged(format!(
            "{SUMMARY_HEADER}\n{}",
            errors.join("\n")
        )))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ErrorCollectorLayer {
    diagnostics: Diagnostics,
}

impl<S: Subscriber> Layer<S> for ErrorCollectorLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.diagnostics.record(visitor.message);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}
