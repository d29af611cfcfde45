//! Sources the published documents are downloaded from.

pub mod nbp;
pub mod util;

use crate::core::model::TableLabel;
use anyhow::Result;
use async_trait::async_trait;

pub use nbp::NbpSource;

/// Fetches raw document bytes. Decoding is left to the caller.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// The latest snapshot table for `label`.
    async fn fetch_snapshot(&self, label: TableLabel) -> Result<Vec<u8>>;

    /// The archive of every table published for `label` in `year`.
    async fn fetch_archive(&self, label: TableLabel, year: i32) -> Result<Vec<u8>>;
}
