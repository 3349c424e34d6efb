//! Error types shared by every stage of a run.
//!
//! Nothing in this crate retries: each variant aborts the run and is surfaced
//! to the process boundary. The watermark is only advanced after a fully
//! successful run, so rerunning after any of these errors is safe.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A required setting is absent or malformed. Raised before any network call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The named recipient list does not exist on the mailing-list service.
    #[error("List '{0}' not found")]
    ListNotFound(String),

    /// A remote call answered with a non-success status.
    #[error("{operation} failed with HTTP {status}: {body}")]
    Transport {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// A remote call reported success but its payload failed a sanity check.
    #[error("Inconsistent response from {operation}: {message}")]
    Inconsistency {
        operation: &'static str,
        message: String,
    },

    /// A draft was created but could not be scheduled; it stays on the service.
    #[error("campaign {campaign_id} was created but not scheduled: {source}")]
    Orphaned {
        campaign_id: i64,
        #[source]
        source: Box<Error>,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing failed: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("Invalid watermark '{value}': {source}")]
    Watermark {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn inconsistency(operation: &'static str, msg: impl Into<String>) -> Self {
        Self::Inconsistency {
            operation,
            message: msg.into(),
        }
    }

    /// Turns a non-success response into [`Error::Transport`], passing success through.
    pub(crate) async fn check_status(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(operation, status = status.as_u16(), %body, "Remote call failed");
        Err(Error::Transport {
            operation,
            status: status.as_u16(),
            body,
        })
    }
}
