//! The browser capability the adapters drive.
//!
//! Every call is bounded by the caller's timeout. Callers treat a timeout the
//! same as "not found": both just mean the page did not give us what we asked
//! for.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("no element matches `{0}`")]
    NotFound(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("invalid selector `{0}`")]
    InvalidSelector(String),
    #[error("{0} is not supported by this browser")]
    Unsupported(&'static str),
    #[error("no page loaded")]
    NoPage,
}

/// Handle to one element on the current page.
pub trait Node {
    /// First descendant matching `selector` (the node itself excluded).
    fn find(&self, selector: &str, timeout: Duration) -> Result<Option<Self>, BrowserError>
    where
        Self: Sized;

    /// Visible text, one line per text run.
    fn text(&self, timeout: Duration) -> Result<String, BrowserError>;

    fn attribute(&self, name: &str, timeout: Duration) -> Result<Option<String>, BrowserError>;

    fn is_visible(&self, timeout: Duration) -> Result<bool, BrowserError>;

    fn click(&self) -> Result<(), BrowserError>;
}

/// A single browsing session. Sessions are reused across every task of a sweep.
pub trait Browser {
    type Node: Node;

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Succeeds once at least one element matches `selector`.
    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    fn query_all(&self, selector: &str) -> Result<Vec<Self::Node>, BrowserError>;

    /// Raw markup of the current page, used for diagnostic snapshots.
    fn content(&self) -> Result<String, BrowserError>;
}
