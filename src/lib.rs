//! # Channel Sales Forecast
//!
//! A library for accumulating periodic per-channel sales uploads and reporting
//! a date range that blends known actuals with projected values.
//!
//! ## Core Concepts
//!
//! - **Entity**: a distribution channel whose sales form an independent series
//! - **Observation Store**: the deduplicated history; a re-uploaded `(entity, date)` replaces the old value
//! - **Strategy**: an entity is modeled daily, or on monthly totals spread back to days
//! - **Actual override**: wherever an actual exists inside the window it replaces the forecast
//! - **Summary**: a date × entity pivot with row, column and grand totals
//!
//! ## Example
//!
//! ```rust,ignore
//! use channel_sales_forecast::*;
//! use chrono::NaiveDate;
//!
//! let config = ForecastConfig::default().with_strategy("Bookstore", Strategy::MonthlyAggregate);
//! let session = ForecastSession::new(config).unwrap();
//!
//! session.ingest(vec![
//!     Observation::new("Online", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 100.0),
//!     Observation::new("Online", NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(), 110.0),
//! ]);
//!
//! let report = session
//!     .report(
//!         NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
//!     )
//!     .unwrap();
//! println!("{}", report.summary.grand_total());
//! ```

pub mod disaggregation;
pub mod error;
pub mod export;
pub mod forecaster;
pub mod ingestion;
pub mod orchestrator;
pub mod schema;
pub mod store;
pub mod strategy;
pub mod summary;
pub mod utils;

pub use disaggregation::spread;
pub use error::{ForecastError, Result};
pub use export::{format_amount, result_set_csv, summary_csv, CsvOptions, DisplayOptions, DisplayTable};
pub use forecaster::{FittedModel, Forecaster, Prediction, TrendForecaster};
pub use ingestion::{LoadedTable, WideTableLoader};
pub use orchestrator::{ForecastRun, Orchestrator, SkipReason, SkippedEntity};
pub use schema::*;
pub use store::{IngestReport, ObservationStore, SharedStore};
pub use strategy::StrategySelector;
pub use summary::{summarize, SummaryRow, SummaryTable};

use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub run: ForecastRun,
    pub summary: SummaryTable,
}

/// Process-wide pipeline: one cumulative store, fed by uploads and read by reports.
pub struct ForecastSession {
    store: SharedStore,
    loader: WideTableLoader,
    orchestrator: Orchestrator,
}

impl ForecastSession {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        let orchestrator = Orchestrator::from_config(&config);
        Ok(Self::assemble(config, orchestrator))
    }

    pub fn with_forecaster(config: ForecastConfig, forecaster: Arc<dyn Forecaster>) -> Result<Self> {
        config.validate()?;
        let orchestrator = Orchestrator::new(forecaster, &config);
        Ok(Self::assemble(config, orchestrator))
    }

    fn assemble(config: ForecastConfig, orchestrator: Orchestrator) -> Self {
        debug!(
            "Session configured with {} strategy overrides, {:?} spread, {:?} boundary policy",
            config.strategies.len(),
            config.spread_policy,
            config.boundary_policy
        );
        Self {
            store: SharedStore::new(),
            loader: WideTableLoader::new(config.loader),
            orchestrator,
        }
    }

    pub fn ingest(&self, records: Vec<Observation>) -> IngestReport {
        self.store.ingest(records)
    }

    /// Loads a wide CSV upload and merges it into the store.
    pub fn upload_csv(&self, bytes: &[u8]) -> Result<IngestReport> {
        let table = self.loader.load_bytes(bytes)?;
        let report = self.store.ingest(table.observations);
        info!(
            "Upload merged: {} new, {} replaced, {} cells dropped",
            report.inserted, report.replaced, table.dropped_cells
        );
        Ok(report)
    }

    pub fn snapshot(&self) -> Arc<ObservationStore> {
        self.store.snapshot()
    }

    pub fn forecast(&self, start: NaiveDate, end: NaiveDate) -> Result<ForecastRun> {
        let snapshot = self.store.snapshot();
        self.orchestrator.forecast(&snapshot, start, end)
    }

    pub fn report(&self, start: NaiveDate, end: NaiveDate) -> Result<ForecastReport> {
        let run = self.forecast(start, end)?;
        let summary = summarize(&run.points);
        Ok(ForecastReport { run, summary })
    }
}
