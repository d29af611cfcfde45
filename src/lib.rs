pub mod cli;
pub mod core;
pub mod documents;
pub mod inbox;
pub mod pipeline;
pub mod providers;
pub mod reconcile;
pub mod store;
pub mod trend;

use crate::core::config::AppConfig;
use crate::core::price::HistoryRange;
use crate::inbox::DocumentInbox;
use crate::pipeline::{ChangeCallback, Pipeline};
use crate::providers::NbpSource;
use crate::store::DiskStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Commands runnable against a loaded configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Refresh,
    Process,
    Sync,
    Rates,
    History {
        code: String,
        range: HistoryRange,
    },
    Forecast {
        code: String,
        horizon_days: Option<u32>,
    },
    Watch,
}

pub async fn run_command(cmd: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fxtrend starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let on_change: Option<ChangeCallback> = match cmd {
        AppCommand::Watch => Some(Arc::new(cli::sync::display_commit)),
        _ => None,
    };
    let pipeline = build_pipeline(&config, on_change)?;

    match cmd {
        AppCommand::Refresh => cli::sync::run_refresh(&pipeline).await,
        AppCommand::Process => cli::sync::run_process(&pipeline).await,
        AppCommand::Sync => cli::sync::run_sync(&pipeline).await,
        AppCommand::Rates => cli::rates::run(&pipeline),
        AppCommand::History { code, range } => cli::history::run(&pipeline, &code, range),
        AppCommand::Forecast { code, horizon_days } => cli::forecast::run(
            &pipeline,
            &code,
            horizon_days.unwrap_or(config.forecast.horizon_days),
        ),
        AppCommand::Watch => cli::watch::run(&pipeline, &config.schedule).await,
    }
}

/// Wires the HTTP source, import directory and disk store from `config`.
pub fn build_pipeline(config: &AppConfig, on_change: Option<ChangeCallback>) -> Result<Pipeline> {
    let source = NbpSource::new(
        &config.source.base_url,
        config.source.retries,
        config.source.retry_delay_ms,
    )?;
    let inbox = DocumentInbox::new(config.default_import_path()?);

    let data_path = config.default_data_path()?;
    let store = DiskStore::open(&data_path)
        .with_context(|| format!("Failed to open store at {}", data_path.display()))?;
    debug!(
        "Using import directory {} and store {}",
        inbox.root().display(),
        data_path.display()
    );

    let pipeline = Pipeline::new(Arc::new(source), inbox, Arc::new(store));
    Ok(match on_change {
        Some(callback) => pipeline.with_change_callback(callback),
        None => pipeline,
    })
}
