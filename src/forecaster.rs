//! Forecasting capability used by the orchestrator.
//!
//! The orchestrator only depends on [`Forecaster`] and [`FittedModel`]. The
//! bundled [`TrendForecaster`] fits a least-squares linear trend over day
//! offsets, optionally adds a day-of-week profile, and estimates an
//! uncertainty interval by sampling residual noise and slope error.

use crate::error::{ForecastError, Result};
use crate::schema::{TrendSettings, WeeklySeasonality};
use chrono::{Datelike, NaiveDate};
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub value: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

pub trait Forecaster: Send + Sync {
    /// Fits a model on a date-sorted series. Spacing may be irregular.
    fn fit(&self, series: &[(NaiveDate, f64)]) -> Result<Box<dyn FittedModel>>;
}

pub trait FittedModel: Send {
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>>;
}

#[derive(Debug, Clone, Default)]
pub struct TrendForecaster {
    settings: TrendSettings,
}

impl TrendForecaster {
    pub fn new(settings: TrendSettings) -> Self {
        Self { settings }
    }

    fn weekly_enabled(&self, xs: &[f64]) -> bool {
        match self.settings.weekly_seasonality {
            WeeklySeasonality::On => true,
            WeeklySeasonality::Off => false,
            WeeklySeasonality::Auto => {
                let span = xs.last().copied().unwrap_or(0.0) - xs.first().copied().unwrap_or(0.0);
                let min_gap = xs
                    .windows(2)
                    .map(|w| w[1] - w[0])
                    .fold(f64::INFINITY, f64::min);
                span >= 14.0 && min_gap < 7.0
            }
        }
    }
}

impl Forecaster for TrendForecaster {
    fn fit(&self, series: &[(NaiveDate, f64)]) -> Result<Box<dyn FittedModel>> {
        if series.len() < 2 {
            return Err(ForecastError::ModelFit(format!(
                "need at least 2 points, got {}",
                series.len()
            )));
        }

        if let Some((date, _)) = series.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ForecastError::ModelFit(format!(
                "non-finite value on {}",
                date
            )));
        }

        let origin = series[0].0;
        let xs: Vec<f64> = series
            .iter()
            .map(|(d, _)| (*d - origin).num_days() as f64)
            .collect();
        let ys: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
        let n = xs.len() as f64;

        let x_mean = xs.iter().sum::<f64>() / n;
        let y_mean = ys.iter().sum::<f64>() / n;
        let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
        if sxx <= f64::EPSILON {
            return Err(ForecastError::ModelFit(
                "degenerate series: all points share one date".to_string(),
            ));
        }
        let sxy: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (x - x_mean) * (y - y_mean))
            .sum();

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;

        let mut residuals: Vec<f64> = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| y - (intercept + slope * x))
            .collect();

        let weekly = if self.weekly_enabled(&xs) {
            let mut sums = [0.0; 7];
            let mut counts = [0usize; 7];
            for ((date, _), r) in series.iter().zip(&residuals) {
                let idx = date.weekday().num_days_from_monday() as usize;
                sums[idx] += r;
                counts[idx] += 1;
            }
            let mut profile = [0.0; 7];
            for i in 0..7 {
                if counts[i] > 0 {
                    profile[i] = sums[i] / counts[i] as f64;
                }
            }
            for ((date, _), r) in series.iter().zip(residuals.iter_mut()) {
                *r -= profile[date.weekday().num_days_from_monday() as usize];
            }
            Some(profile)
        } else {
            None
        };

        let sigma = if series.len() > 2 {
            (residuals.iter().map(|r| r * r).sum::<f64>() / (n - 2.0)).sqrt()
        } else {
            0.0
        };
        let slope_error = sigma / sxx.sqrt();

        debug!(
            "Fitted trend on {} points: slope {:.4}/day, sigma {:.4}, weekly {}",
            series.len(),
            slope,
            sigma,
            weekly.is_some()
        );

        Ok(Box::new(TrendModel {
            origin,
            intercept,
            slope,
            weekly,
            sigma,
            slope_error,
            last_offset: xs[xs.len() - 1],
            settings: self.settings.clone(),
        }))
    }
}

struct TrendModel {
    origin: NaiveDate,
    intercept: f64,
    slope: f64,
    weekly: Option<[f64; 7]>,
    sigma: f64,
    slope_error: f64,
    last_offset: f64,
    settings: TrendSettings,
}

impl TrendModel {
    fn point(&self, date: NaiveDate) -> (f64, f64) {
        let x = (date - self.origin).num_days() as f64;
        let seasonal = self
            .weekly
            .map(|p| p[date.weekday().num_days_from_monday() as usize])
            .unwrap_or(0.0);
        (x, self.intercept + self.slope * x + seasonal)
    }

    fn interval(&self, rng: &mut StdRng, noise: &Normal<f64>, horizon: f64, yhat: f64) -> (f64, f64) {
        let samples = self.settings.uncertainty_samples.max(1);
        let mut draws: Vec<f64> = (0..samples)
            .map(|_| {
                let slope_shift = noise.sample(&mut *rng) * self.slope_error * horizon;
                yhat + noise.sample(&mut *rng) * self.sigma + slope_shift
            })
            .collect();
        draws.sort_by(|a, b| a.total_cmp(b));

        let tail = (1.0 - self.settings.interval_width) / 2.0;
        let last = (draws.len() - 1) as f64;
        let lower = draws[(tail * last).round() as usize];
        let upper = draws[((1.0 - tail) * last).round() as usize];
        (lower, upper)
    }
}

impl FittedModel for TrendModel {
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>> {
        let noise = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::ModelFit(format!("noise distribution: {}", e)))?;
        let mut rng = StdRng::seed_from_u64(self.settings.seed);

        Ok(dates
            .iter()
            .map(|&date| {
                let (x, value) = self.point(date);
                let horizon = (x - self.last_offset).max(0.0);
                let (lower, upper) = self.interval(&mut rng, &noise, horizon, value);
                Prediction {
                    date,
                    value,
                    lower: Some(lower),
                    upper: Some(upper),
                }
            })
            .collect())
    }
}
