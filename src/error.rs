//! Error taxonomy for loading and rendering documents.
//!
//! Both error types are plain data (`Clone`) so the controller can keep the
//! last failure in its state and show it until the user acts on it.

use std::time::Duration;

use thiserror::Error;

/// The document could not be fetched, read, or parsed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("failed to fetch {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("timed out after {:.1}s fetching {url}", .after.as_secs_f64())]
    Timeout { url: String, after: Duration },

    #[error("document exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("not a readable PDF document: {0}")]
    Parse(String),

    #[error("PDFium library unavailable: {0}")]
    Library(String),

    #[error("load cancelled")]
    Cancelled,
}

/// A single page failed to rasterize. The document stays usable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: u32 },

    #[error("no document is loaded")]
    NoDocument,

    #[error("page {page} failed to render: {reason}")]
    Backend { page: u32, reason: String },
}
