use super::ui;
use crate::core::config::ScheduleConfig;
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Runs refresh and process on their own intervals until Ctrl+C.
pub async fn run(pipeline: &Pipeline, schedule: &ScheduleConfig) -> Result<()> {
    let (download_every, process_every) = intervals(schedule);
    println!(
        "{} downloading every {} min, processing every {} s. Press Ctrl+C to stop.",
        ui::paint("Watching", ui::Tone::Key),
        download_every.as_secs() / 60,
        process_every.as_secs()
    );
    run_until(pipeline, schedule, tokio::signal::ctrl_c()).await
}

/// Runs the schedule until `shutdown` resolves. A shutdown requested while a
/// step is running stops the loop once that step finishes.
pub async fn run_until(
    pipeline: &Pipeline,
    schedule: &ScheduleConfig,
    shutdown: impl Future<Output = io::Result<()>>,
) -> Result<()> {
    let (download_every, process_every) = intervals(schedule);
    let mut download = interval(download_every);
    download.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut process = interval(process_every);
    process.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            // Polled in order, so a download due together with processing runs first
            biased;
            result = &mut shutdown => {
                result.context("Failed to listen for shutdown signal")?;
                info!("Stopping watch");
                break;
            }
            _ = download.tick() => {
                let report = pipeline.refresh_documents().await;
                debug!("Refresh finished with {} failures", report.failures().count());
            }
            _ = process.tick() => {
                let result = pipeline.process_documents().await;
                debug!("Processing finished for {} tables", result.len());
            }
        }
    }
    Ok(())
}

fn intervals(schedule: &ScheduleConfig) -> (Duration, Duration) {
    let download_mins = schedule.download_interval_mins.max(1);
    (
        Duration::from_secs(download_mins.saturating_mul(60)),
        Duration::from_secs(schedule.process_interval_secs.max(1)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::TableLabel;
    use crate::inbox::DocumentInbox;
    use crate::providers::DocumentSource;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    /// Source whose every download fails, counting snapshot requests.
    #[derive(Default)]
    struct OfflineSource {
        snapshot_calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSource for OfflineSource {
        async fn fetch_snapshot(&self, label: TableLabel) -> anyhow::Result<Vec<u8>> {
            self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("offline, no snapshot {}", label))
        }

        async fn fetch_archive(&self, label: TableLabel, _year: i32) -> anyhow::Result<Vec<u8>> {
            Err(anyhow::anyhow!("offline, no archive {}", label))
        }
    }

    #[test]
    fn test_intervals_clamp_and_saturate() {
        let (download, process) = intervals(&ScheduleConfig {
            download_interval_mins: 0,
            process_interval_secs: 0,
        });
        assert_eq!(download, Duration::from_secs(60));
        assert_eq!(process, Duration::from_secs(1));

        let (download, _) = intervals(&ScheduleConfig {
            download_interval_mins: u64::MAX,
            process_interval_secs: 60,
        });
        assert_eq!(download, Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(OfflineSource::default());
        let pipeline = Pipeline::new(
            source.clone(),
            DocumentInbox::new(dir.path().join("import")),
            Arc::new(MemoryStore::new()),
        );
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(());
        });

        let shutdown = async move { rx.await.map_err(io::Error::other) };
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_until(&pipeline, &ScheduleConfig::default(), shutdown),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        // The first download tick fires immediately, once per table
        assert_eq!(source.snapshot_calls.load(Ordering::SeqCst), 2);
    }
}
