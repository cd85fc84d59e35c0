//! Accumulated, deduplicated sales history.
//!
//! The store is keyed by entity and then by date, so the `(entity, date)`
//! uniqueness invariant is carried by the map structure itself. Ingesting a
//! record whose key already exists replaces the stored value (last write wins).

use crate::schema::Observation;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// One entity's history, ordered by date.
pub type EntitySeries = BTreeMap<NaiveDate, f64>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub replaced: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationStore {
    series: BTreeMap<String, EntitySeries>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `records` into the store. Within a batch, later records win too.
    pub fn ingest<I>(&mut self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut report = IngestReport::default();

        for record in records {
            let series = self.series.entry(record.entity).or_default();
            match series.insert(record.date, record.value) {
                Some(_) => report.replaced += 1,
                None => report.inserted += 1,
            }
        }

        debug!(
            "Ingested {} new and {} replacement observations ({} entities held)",
            report.inserted,
            report.replaced,
            self.series.len()
        );

        report
    }

    pub fn get(&self, entity: &str, date: NaiveDate) -> Option<f64> {
        self.series.get(entity).and_then(|s| s.get(&date)).copied()
    }

    pub fn series(&self, entity: &str) -> Option<&EntitySeries> {
        self.series.get(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntitySeries)> {
        self.series.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn entity_count(&self) -> usize {
        self.series.len()
    }

    /// Number of distinct `(entity, date)` keys.
    pub fn len(&self) -> usize {
        self.series.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.series
            .values()
            .filter_map(|s| s.keys().next_back().copied())
            .max()
    }

    /// Flattened view, ordered by entity then date.
    pub fn observations(&self) -> Vec<Observation> {
        self.iter()
            .flat_map(|(entity, series)| {
                series
                    .iter()
                    .map(move |(date, value)| Observation::new(entity, *date, *value))
            })
            .collect()
    }
}

/// A store shared between ingest and forecast callers.
///
/// Readers take an `Arc` snapshot; writers copy on write, so a snapshot never
/// observes an ingest that started after it was taken.
#[derive(Debug, Default)]
pub struct SharedStore {
    inner: RwLock<Arc<ObservationStore>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_store(store: ObservationStore) -> Self {
        Self {
            inner: RwLock::new(Arc::new(store)),
        }
    }

    pub fn ingest<I>(&self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::make_mut(&mut *guard).ingest(records)
    }

    pub fn snapshot(&self) -> Arc<ObservationStore> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }
}
