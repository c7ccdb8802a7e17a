//! Error type for webhook delivery.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("notifier webhook returned {0}")]
    NonSuccessStatus(reqwest::StatusCode),
}
