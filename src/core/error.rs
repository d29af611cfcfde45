//! Error types shared by the ingestion pipeline.
//!
//! Each stage has its own error so callers can tell a bad document from a
//! storage problem. `PipelineError` wraps them together with the table label
//! and the kind of document that was being handled.

use crate::core::model::TableLabel;
use chrono::NaiveDate;
use std::fmt::Display;
use thiserror::Error;

/// Which source document an error relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Snapshot,
    Archive,
}

impl Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Snapshot => write!(f, "snapshot"),
            DocumentKind::Archive => write!(f, "archive"),
        }
    }
}

/// Decoding failures for snapshot and archive documents.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid XML: {0}")]
    Xml(String),

    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid decimal value '{0}'")]
    Decimal(String),

    #[error("value must be positive, got '{0}'")]
    NotPositive(String),

    #[error("invalid date '{0}'")]
    Date(String),

    #[error("malformed currency header token '{0}'")]
    HeaderToken(String),

    #[error("currency code {0} appears more than once")]
    DuplicateCode(String),

    #[error("entry {index}: {message}")]
    Entry { index: usize, message: String },

    #[error("row {row}: {message}")]
    Row { row: usize, message: String },

    #[error("document has no currency entries")]
    NoEntries,

    #[error("archive is missing its header rows")]
    MissingHeader,

    #[error("archive contains no data rows")]
    EmptyArchive,

    #[error("document holds table {found}, expected table {expected}")]
    LabelMismatch { expected: TableLabel, found: String },
}

/// Failures reported by a persistence gateway or a unit of work.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} does not exist")]
    NotFound(String),

    #[error("currency {code} already has a price for {date}")]
    DuplicatePrice { code: String, date: NaiveDate },
}

impl From<fjall::Error> for StoreError {
    fn from(err: fjall::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Per-label failure surfaced by the pipeline entry points.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to obtain {document} for table {label}: {reason}")]
    Download {
        label: TableLabel,
        document: DocumentKind,
        reason: String,
    },

    #[error("failed to parse {document} for table {label}: {source}")]
    Parse {
        label: TableLabel,
        document: DocumentKind,
        #[source]
        source: ParseError,
    },

    #[error("failed to access {document} for table {label} in the import directory: {reason}")]
    Inbox {
        label: TableLabel,
        document: DocumentKind,
        reason: String,
    },

    #[error("failed to persist table {label}: {source}")]
    Persist {
        label: TableLabel,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    pub fn label(&self) -> TableLabel {
        match self {
            PipelineError::Download { label, .. }
            | PipelineError::Parse { label, .. }
            | PipelineError::Inbox { label, .. }
            | PipelineError::Persist { label, .. } => *label,
        }
    }
}

/// Numerical failures of the trend engine.
#[derive(Error, Debug, PartialEq)]
pub enum TrendError {
    #[error("need at least {needed} points, got {got}")]
    InsufficientPoints { needed: usize, got: usize },

    #[error("design matrix is singular")]
    Singular,

    #[error("no points within the last {horizon_days} days")]
    NoRecentPoints { horizon_days: u32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
