//! Repository logger.
//!
//! Events go through `tracing`. A logger without a dispatch uses whatever
//! subscriber is current for the calling thread (normally the process-wide
//! default); one built with [`Logger::with_dispatch`] always writes to its own
//! subscriber.

use tracing::{dispatcher, Dispatch};

use crate::error::DalError;

#[derive(Clone, Default)]
pub struct Logger {
    dispatch: Option<Dispatch>,
}

impl Logger {
    /// Logger bound to a specific subscriber.
    pub fn with_dispatch(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    fn scoped<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    pub fn debug(&self, operation: &str, message: &str) {
        self.scoped(|| tracing::debug!(operation, "{}", message));
    }

    pub fn info(&self, operation: &str, message: &str) {
        self.scoped(|| tracing::info!(operation, "{}", message));
    }

    /// Log a failed operation with its error.
    pub fn error(&self, operation: &str, error: &DalError) {
        self.scoped(|| tracing::error!(operation, error = %error, "{} failed", operation));
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("injected", &self.dispatch.is_some())
            .finish()
    }
}
