use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One verified sales figure for one entity on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Observation {
    pub entity: String,
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(entity: impl Into<String>, date: NaiveDate, value: f64) -> Self {
        Self {
            entity: entity.into(),
            date,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub entity: String,
    pub date: NaiveDate,
    pub predicted_value: f64,
    /// True when the value is a stored actual rather than model output.
    pub is_actual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<f64>,
}

impl ForecastPoint {
    pub fn actual(entity: &str, date: NaiveDate, value: f64) -> Self {
        Self {
            entity: entity.to_string(),
            date,
            predicted_value: value,
            is_actual: true,
            lower_bound: None,
            upper_bound: None,
        }
    }

    pub fn forecast(entity: &str, date: NaiveDate, value: f64) -> Self {
        Self {
            entity: entity.to_string(),
            date,
            predicted_value: value,
            is_actual: false,
            lower_bound: None,
            upper_bound: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Strategy {
    #[schemars(description = "Dense daily actuals, modeled directly at daily resolution.")]
    #[default]
    Daily,

    #[schemars(
        description = "Sparse or month-bucketed totals. Modeled on monthly sums, then spread back to days."
    )]
    MonthlyAggregate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum SpreadPolicy {
    #[schemars(description = "Same share on every calendar day of the month.")]
    #[default]
    Even,

    #[schemars(description = "Same share on Monday to Friday only. Weekends get no entry.")]
    WeekdaysOnly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum BoundaryPolicy {
    #[schemars(
        description = "Entities whose latest actual is after the end date get no forecast extension; only their actuals in range are returned."
    )]
    #[default]
    ActualsOnly,

    #[schemars(
        description = "Fail the whole request if any entity has an actual after the end date."
    )]
    Reject,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum WeeklySeasonality {
    /// Enabled when history spans at least two weeks and points are less than a week apart.
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct TrendSettings {
    pub weekly_seasonality: WeeklySeasonality,

    #[schemars(description = "Width of the uncertainty interval, strictly between 0 and 1.")]
    pub interval_width: f64,

    #[schemars(description = "Number of Monte-Carlo draws used to estimate the interval.")]
    pub uncertainty_samples: usize,

    pub seed: u64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            weekly_seasonality: WeeklySeasonality::Auto,
            interval_width: 0.8,
            uncertainty_samples: 500,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct LoaderSettings {
    #[schemars(
        description = "Case-insensitive substrings that identify the date column in the header row."
    )]
    pub date_column_hints: Vec<String>,

    #[schemars(
        description = "Rows to skip before the header row. Uploads carry one sheet title row by default."
    )]
    pub header_skip_rows: usize,

    #[schemars(description = "Round loaded values to whole units.")]
    pub round_values: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            date_column_hints: vec![
                "date".to_string(),
                "일자".to_string(),
                "날짜".to_string(),
            ],
            header_skip_rows: 1,
            round_values: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ForecastConfig {
    #[schemars(
        description = "Per-entity modeling strategy. Entities not listed are modeled Daily."
    )]
    pub strategies: BTreeMap<String, Strategy>,

    pub spread_policy: SpreadPolicy,

    pub boundary_policy: BoundaryPolicy,

    #[schemars(description = "Forecast entities on the rayon thread pool.")]
    pub parallel: bool,

    #[schemars(
        description = "Upper bound in milliseconds on fit plus predict for one entity. A timeout skips the entity."
    )]
    pub fit_timeout_ms: Option<u64>,

    pub trend: TrendSettings,

    pub loader: LoaderSettings,
}

impl ForecastConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ForecastConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn with_strategy(mut self, entity: impl Into<String>, strategy: Strategy) -> Self {
        self.strategies.insert(entity.into(), strategy);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let width = self.trend.interval_width;
        if !(width > 0.0 && width < 1.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "interval_width {} must be strictly between 0 and 1",
                width
            )));
        }

        if self.trend.uncertainty_samples == 0 {
            return Err(ForecastError::InvalidConfig(
                "uncertainty_samples must be at least 1".to_string(),
            ));
        }

        if self.loader.date_column_hints.is_empty() {
            return Err(ForecastError::InvalidConfig(
                "date_column_hints must not be empty".to_string(),
            ));
        }

        if self.fit_timeout_ms == Some(0) {
            return Err(ForecastError::InvalidConfig(
                "fit_timeout_ms must be positive when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ForecastConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
