use crate::core::model::TableLabel;
use crate::providers::DocumentSource;
use crate::providers::util::with_retry;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Downloads tables from the NBP publication server.
pub struct NbpSource {
    base_url: String,
    client: reqwest::Client,
    retries: usize,
    retry_delay_ms: u64,
}

impl NbpSource {
    pub fn new(base_url: &str, retries: usize, retry_delay_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fxtrend/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retries,
            retry_delay_ms,
        })
    }

    pub fn snapshot_url(&self, label: TableLabel) -> String {
        format!("{}/kursy/xml/Last{}.xml", self.base_url, label.as_str())
    }

    pub fn archive_url(&self, label: TableLabel, year: i32) -> String {
        format!(
            "{}/kursy/Archiwum/archiwum_tab_{}_{}.csv",
            self.base_url,
            label.as_lower(),
            year
        )
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Requesting {}", url);
        let response = with_retry(
            || async move { self.client.get(url).send().await?.error_for_status() },
            self.retries,
            self.retry_delay_ms,
        )
        .await
        .with_context(|| format!("Failed to download {url}"))?;

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {url}"))?;
        if bytes.is_empty() {
            return Err(anyhow!("Received empty document from {}", url));
        }
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DocumentSource for NbpSource {
    #[instrument(name = "SnapshotFetch", skip(self), fields(label = %label))]
    async fn fetch_snapshot(&self, label: TableLabel) -> Result<Vec<u8>> {
        self.download(&self.snapshot_url(label)).await
    }

    #[instrument(name = "ArchiveFetch", skip(self), fields(label = %label, year = year))]
    async fn fetch_archive(&self, label: TableLabel, year: i32) -> Result<Vec<u8>> {
        self.download(&self.archive_url(label, year)).await
    }
}
