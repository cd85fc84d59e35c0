use crate::disaggregation::spread;
use crate::error::{ForecastError, Result};
use crate::forecaster::{Forecaster, Prediction, TrendForecaster};
use crate::schema::{BoundaryPolicy, ForecastConfig, ForecastPoint, SpreadPolicy, Strategy};
use crate::store::{EntitySeries, ObservationStore};
use crate::strategy::StrategySelector;
use crate::utils::{days_in_range, first_day_of_month, get_month_starts_in_period, round_non_negative};
use chrono::{Days, NaiveDate};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Why an entity is missing from a forecast run.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    #[error("insufficient data: {points} point(s) to fit, need at least 2")]
    InsufficientData { points: usize },

    #[error("model failure: {0}")]
    ModelFailure(String),

    #[error("forecast did not finish within {after_ms} ms")]
    TimedOut { after_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntity {
    pub entity: String,
    pub reason: SkipReason,
}

/// Result set of one orchestration call plus the entities left out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRun {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Ordered by date, then entity.
    pub points: Vec<ForecastPoint>,
    pub skipped: Vec<SkippedEntity>,
}

impl ForecastRun {
    pub fn points_for<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a ForecastPoint> + 'a {
        self.points.iter().filter(move |p| p.entity == entity)
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

enum EntityOutcome {
    Points(Vec<ForecastPoint>),
    Skipped(SkippedEntity),
}

pub struct Orchestrator {
    forecaster: Arc<dyn Forecaster>,
    selector: StrategySelector,
    spread_policy: SpreadPolicy,
    boundary_policy: BoundaryPolicy,
    parallel: bool,
    fit_timeout_ms: Option<u64>,
}

impl Orchestrator {
    pub fn new(forecaster: Arc<dyn Forecaster>, config: &ForecastConfig) -> Self {
        Self {
            forecaster,
            selector: StrategySelector::new(config.strategies.clone()),
            spread_policy: config.spread_policy,
            boundary_policy: config.boundary_policy,
            parallel: config.parallel,
            fit_timeout_ms: config.fit_timeout_ms,
        }
    }

    /// Uses the bundled [`TrendForecaster`] configured from `config.trend`.
    pub fn from_config(config: &ForecastConfig) -> Self {
        let forecaster = Arc::new(TrendForecaster::new(config.trend.clone()));
        Self::new(forecaster, config)
    }

    pub fn forecast(
        &self,
        store: &ObservationStore,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ForecastRun> {
        if start > end {
            return Err(ForecastError::InvalidRange { start, end });
        }

        if self.boundary_policy == BoundaryPolicy::Reject {
            for (entity, series) in store.iter() {
                if let Some(&latest) = series.keys().next_back() {
                    if latest > end {
                        return Err(ForecastError::EndBeforeLatestActual {
                            entity: entity.to_string(),
                            end,
                            latest,
                        });
                    }
                }
            }
        }

        info!(
            "Forecasting {} entities for {}..={}",
            store.entity_count(),
            start,
            end
        );

        let entities: Vec<(&str, &EntitySeries)> = store.iter().collect();
        let outcomes: Vec<EntityOutcome> = if self.parallel {
            entities
                .par_iter()
                .map(|(entity, series)| self.forecast_entity(entity, series, start, end))
                .collect()
        } else {
            entities
                .iter()
                .map(|(entity, series)| self.forecast_entity(entity, series, start, end))
                .collect()
        };

        let mut points = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                EntityOutcome::Points(p) => points.extend(p),
                EntityOutcome::Skipped(s) => {
                    warn!("Skipping entity '{}': {}", s.entity, s.reason);
                    skipped.push(s);
                }
            }
        }
        points.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.entity.cmp(&b.entity)));

        info!(
            "Forecast produced {} points; {} entities skipped",
            points.len(),
            skipped.len()
        );

        Ok(ForecastRun {
            start,
            end,
            points,
            skipped,
        })
    }

    fn forecast_entity(
        &self,
        entity: &str,
        series: &EntitySeries,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EntityOutcome {
        let skip = |reason| {
            EntityOutcome::Skipped(SkippedEntity {
                entity: entity.to_string(),
                reason,
            })
        };

        let history: Vec<(NaiveDate, f64)> = series.iter().map(|(d, v)| (*d, *v)).collect();
        let strategy = self.selector.select_strategy(entity);

        // Monthly models fit one point per month.
        let fit_points = match strategy {
            Strategy::Daily => history.len(),
            Strategy::MonthlyAggregate => monthly_totals(&history).len(),
        };
        if fit_points < 2 {
            return skip(SkipReason::InsufficientData { points: fit_points });
        }

        let last_date = history[history.len() - 1].0;

        let predictions = if last_date > end {
            debug!(
                "Entity '{}' has actuals past {}; returning actuals only",
                entity, end
            );
            Vec::new()
        } else {
            debug!(
                "Entity '{}' ({:?}): {} points, last actual {}",
                entity,
                strategy,
                history.len(),
                last_date
            );
            match self.run_bounded(history, strategy, end) {
                Ok(p) => p,
                Err(reason) => return skip(reason),
            }
        };

        let mut merged: BTreeMap<NaiveDate, ForecastPoint> = predictions
            .into_iter()
            .filter(|p| p.date >= start && p.date <= end)
            .map(|p| {
                let point = ForecastPoint {
                    lower_bound: p.lower.map(round_non_negative),
                    upper_bound: p.upper.map(round_non_negative),
                    ..ForecastPoint::forecast(entity, p.date, round_non_negative(p.value))
                };
                (p.date, point)
            })
            .collect();

        for (date, value) in series.range(start..=end) {
            merged.insert(*date, ForecastPoint::actual(entity, *date, *value));
        }

        EntityOutcome::Points(merged.into_values().collect())
    }

    fn run_bounded(
        &self,
        history: Vec<(NaiveDate, f64)>,
        strategy: Strategy,
        end: NaiveDate,
    ) -> std::result::Result<Vec<Prediction>, SkipReason> {
        let policy = self.spread_policy;

        let Some(limit_ms) = self.fit_timeout_ms else {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                project(self.forecaster.as_ref(), strategy, policy, &history, end)
            }));
            return match outcome {
                Ok(result) => result.map_err(|e| SkipReason::ModelFailure(e.to_string())),
                Err(_) => Err(SkipReason::ModelFailure("forecaster panicked".to_string())),
            };
        };

        let (tx, rx) = mpsc::channel();
        let forecaster = Arc::clone(&self.forecaster);
        thread::spawn(move || {
            let _ = tx.send(project(forecaster.as_ref(), strategy, policy, &history, end));
        });

        match rx.recv_timeout(Duration::from_millis(limit_ms)) {
            Ok(result) => result.map_err(|e| SkipReason::ModelFailure(e.to_string())),
            Err(RecvTimeoutError::Timeout) => Err(SkipReason::TimedOut { after_ms: limit_ms }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(SkipReason::ModelFailure("forecaster panicked".to_string()))
            }
        }
    }
}

/// Fits and predicts one entity's history out to `end`.
fn project(
    forecaster: &dyn Forecaster,
    strategy: Strategy,
    policy: SpreadPolicy,
    history: &[(NaiveDate, f64)],
    end: NaiveDate,
) -> Result<Vec<Prediction>> {
    let predictions = match strategy {
        Strategy::Daily => {
            let last = history[history.len() - 1].0;
            let first = last
                .checked_add_days(Days::new(1))
                .ok_or_else(|| ForecastError::DateError(format!("no day after {}", last)))?;
            let dates = days_in_range(first, end.max(first));

            let model = forecaster.fit(history)?;
            model.predict(&dates)?
        }
        Strategy::MonthlyAggregate => {
            // The last known month is forecast whole, but only its days after
            // the last actual receive a point.
            let last = history[history.len() - 1].0;
            let monthly = monthly_totals(history);
            let last_month = monthly[monthly.len() - 1].0;
            let months = get_month_starts_in_period(last_month, end);

            let model = forecaster.fit(&monthly)?;
            model
                .predict(&months)?
                .into_iter()
                .flat_map(|p| {
                    let monthly_value = if p.value > 0.0 { p.value } else { 0.0 };
                    spread(p.date, monthly_value, policy)
                        .into_iter()
                        .filter(move |(date, _)| *date > last)
                        .map(|(date, value)| Prediction {
                            date,
                            value,
                            lower: None,
                            upper: None,
                        })
                })
                .collect()
        }
    };

    if let Some(bad) = predictions.iter().find(|p| !p.value.is_finite()) {
        return Err(ForecastError::ModelFit(format!(
            "non-finite prediction for {}",
            bad.date
        )));
    }

    Ok(predictions)
}

/// Sums a daily history into totals keyed by the first day of each month.
pub fn monthly_totals(history: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    let mut months: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (date, value) in history {
        *months.entry(first_day_of_month(*date)).or_insert(0.0) += value;
    }
    months.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecaster::FittedModel;
    use crate::schema::Observation;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Predicts a fixed value for every requested date.
    struct ConstantForecaster(f64);

    struct ConstantModel(f64);

    impl Forecaster for ConstantForecaster {
        fn fit(&self, _series: &[(NaiveDate, f64)]) -> Result<Box<dyn FittedModel>> {
            Ok(Box::new(ConstantModel(self.0)))
        }
    }

    impl FittedModel for ConstantModel {
        fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>> {
            Ok(dates
                .iter()
                .map(|&date| Prediction {
                    date,
                    value: self.0,
                    lower: None,
                    upper: None,
                })
                .collect())
        }
    }

    fn orchestrator(value: f64, config: &ForecastConfig) -> Orchestrator {
        Orchestrator::new(Arc::new(ConstantForecaster(value)), config)
    }

    #[test]
    fn test_monthly_totals() {
        let totals = monthly_totals(&[
            (d(2025, 1, 3), 10.0),
            (d(2025, 1, 20), 5.0),
            (d(2025, 2, 1), 7.0),
        ]);
        assert_eq!(totals, vec![(d(2025, 1, 1), 15.0), (d(2025, 2, 1), 7.0)]);
    }

    #[test]
    fn test_invalid_range() {
        let store = ObservationStore::new();
        let result = orchestrator(1.0, &ForecastConfig::default()).forecast(
            &store,
            d(2025, 2, 1),
            d(2025, 1, 1),
        );
        assert!(matches!(result, Err(ForecastError::InvalidRange { .. })));
    }

    #[test]
    fn test_negative_forecasts_are_clamped() {
        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("A", d(2025, 1, 1), 5.0),
            Observation::new("A", d(2025, 1, 2), 3.0),
        ]);

        let run = orchestrator(-12.7, &ForecastConfig::default())
            .forecast(&store, d(2025, 1, 1), d(2025, 1, 5))
            .unwrap();

        assert_eq!(run.points.len(), 5);
        assert!(run.points.iter().all(|p| p.predicted_value >= 0.0));
        assert_eq!(run.points[4].predicted_value, 0.0);
        assert!(!run.points[4].is_actual);
    }

    #[test]
    fn test_forecast_values_are_rounded_but_actuals_are_exact() {
        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("A", d(2025, 1, 1), 10.25),
            Observation::new("A", d(2025, 1, 2), 11.75),
        ]);

        let run = orchestrator(20.6, &ForecastConfig::default())
            .forecast(&store, d(2025, 1, 1), d(2025, 1, 3))
            .unwrap();

        assert_eq!(run.points[0].predicted_value, 10.25);
        assert_eq!(run.points[1].predicted_value, 11.75);
        assert_eq!(run.points[2].predicted_value, 21.0);
    }

    #[test]
    fn test_monthly_strategy_spreads_over_days() {
        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("Shop", d(2025, 1, 31), 3100.0),
            Observation::new("Shop", d(2025, 2, 28), 2800.0),
        ]);
        let config = ForecastConfig::default().with_strategy("Shop", Strategy::MonthlyAggregate);

        let run = orchestrator(3000.0, &config)
            .forecast(&store, d(2025, 3, 1), d(2025, 4, 30))
            .unwrap();

        assert_eq!(run.points.len(), 61);
        let march: f64 = run
            .points
            .iter()
            .filter(|p| p.date < d(2025, 4, 1))
            .map(|p| p.predicted_value)
            .sum();
        assert!((march - 3000.0).abs() <= 31.0);
        assert!(run.points.iter().all(|p| !p.is_actual));
    }

    #[test]
    fn test_monthly_strategy_weekdays_only() {
        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("Shop", d(2025, 1, 31), 100.0),
            Observation::new("Shop", d(2025, 2, 28), 100.0),
        ]);
        let config = ForecastConfig {
            spread_policy: SpreadPolicy::WeekdaysOnly,
            ..ForecastConfig::default().with_strategy("Shop", Strategy::MonthlyAggregate)
        };

        let run = orchestrator(2100.0, &config)
            .forecast(&store, d(2025, 3, 1), d(2025, 3, 31))
            .unwrap();

        assert_eq!(run.points.len(), 21);
        assert!(run.points.iter().all(|p| p.predicted_value == 100.0));
    }

    #[test]
    fn test_monthly_actuals_override_spread_days() {
        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("Shop", d(2025, 1, 10), 40.0),
            Observation::new("Shop", d(2025, 2, 10), 55.0),
        ]);
        let config = ForecastConfig::default().with_strategy("Shop", Strategy::MonthlyAggregate);

        let run = orchestrator(280.0, &config)
            .forecast(&store, d(2025, 2, 1), d(2025, 2, 28))
            .unwrap();

        // The actual on Feb 10 plus spread days Feb 11..=28.
        assert_eq!(run.points.len(), 19);
        let tenth = run.points.iter().find(|p| p.date == d(2025, 2, 10)).unwrap();
        assert!(tenth.is_actual);
        assert_eq!(tenth.predicted_value, 55.0);
        assert_eq!(run.points.iter().filter(|p| p.is_actual).count(), 1);
        assert!(run.points.iter().all(|p| p.is_actual || p.date > d(2025, 2, 10)));
    }

    #[test]
    fn test_known_month_is_not_counted_twice() {
        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("Shop", d(2025, 1, 31), 3100.0),
            Observation::new("Shop", d(2025, 2, 28), 2800.0),
        ]);
        let config = ForecastConfig::default().with_strategy("Shop", Strategy::MonthlyAggregate);

        let run = orchestrator(2800.0, &config)
            .forecast(&store, d(2025, 2, 1), d(2025, 2, 28))
            .unwrap();

        let february: f64 = run.points.iter().map(|p| p.predicted_value).sum();
        assert_eq!(february, 2800.0);
        assert_eq!(run.points, vec![ForecastPoint::actual("Shop", d(2025, 2, 28), 2800.0)]);
    }

    #[test]
    fn test_single_month_history_is_insufficient_for_monthly_model() {
        let mut store = ObservationStore::new();
        store.ingest((1..=30).map(|day| Observation::new("Web", d(2025, 1, day), 10.0)));
        let config = ForecastConfig::default().with_strategy("Web", Strategy::MonthlyAggregate);

        let run = orchestrator(300.0, &config)
            .forecast(&store, d(2025, 1, 1), d(2025, 2, 28))
            .unwrap();

        assert!(run.points.is_empty());
        assert_eq!(
            run.skipped,
            vec![SkippedEntity {
                entity: "Web".to_string(),
                reason: SkipReason::InsufficientData { points: 1 },
            }]
        );
    }

    #[test]
    fn test_actuals_only_boundary_policy() {
        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("A", d(2025, 1, 1), 1.0),
            Observation::new("A", d(2025, 1, 2), 2.0),
            Observation::new("A", d(2025, 1, 10), 3.0),
            Observation::new("B", d(2025, 1, 1), 4.0),
            Observation::new("B", d(2025, 1, 3), 5.0),
        ]);

        let run = orchestrator(9.0, &ForecastConfig::default())
            .forecast(&store, d(2025, 1, 1), d(2025, 1, 5))
            .unwrap();

        let a: Vec<_> = run.points_for("A").collect();
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|p| p.is_actual));

        let b: Vec<_> = run.points_for("B").collect();
        assert_eq!(b.len(), 4);
        assert_eq!(b.iter().filter(|p| !p.is_actual).count(), 2);
    }

    #[test]
    fn test_reject_boundary_policy() {
        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("A", d(2025, 1, 1), 1.0),
            Observation::new("A", d(2025, 1, 10), 3.0),
        ]);
        let config = ForecastConfig {
            boundary_policy: BoundaryPolicy::Reject,
            ..Default::default()
        };

        let result = orchestrator(1.0, &config).forecast(&store, d(2025, 1, 1), d(2025, 1, 5));
        assert!(matches!(
            result,
            Err(ForecastError::EndBeforeLatestActual { .. })
        ));

        let ok = orchestrator(1.0, &config).forecast(&store, d(2025, 1, 1), d(2025, 1, 10));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_end_equal_to_last_date_has_no_forecast() {
        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("A", d(2025, 1, 1), 1.0),
            Observation::new("A", d(2025, 1, 2), 2.0),
        ]);

        let run = orchestrator(5.0, &ForecastConfig::default())
            .forecast(&store, d(2025, 1, 2), d(2025, 1, 2))
            .unwrap();

        assert_eq!(run.points, vec![ForecastPoint::actual("A", d(2025, 1, 2), 2.0)]);
    }

    #[test]
    fn test_panicking_forecaster_is_isolated() {
        struct Panicky;
        impl Forecaster for Panicky {
            fn fit(&self, _series: &[(NaiveDate, f64)]) -> Result<Box<dyn FittedModel>> {
                panic!("model blew up");
            }
        }

        let mut store = ObservationStore::new();
        store.ingest(vec![
            Observation::new("A", d(2025, 1, 1), 1.0),
            Observation::new("A", d(2025, 1, 2), 2.0),
        ]);

        let run = Orchestrator::new(Arc::new(Panicky), &ForecastConfig::default())
            .forecast(&store, d(2025, 1, 1), d(2025, 1, 3))
            .unwrap();

        assert!(run.points.is_empty());
        assert!(matches!(run.skipped[0].reason, SkipReason::ModelFailure(_)));
    }
}
