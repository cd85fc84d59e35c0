use crate::schema::ForecastPoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DATE_COLUMN: &str = "date";
pub const TOTAL_COLUMN: &str = "total";

/// One date's row: a value per entity (zero when absent) and their sum.
/// Entity values stay nested so an entity named like a fixed field cannot
/// shadow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
    pub total: f64,
}

/// Date × entity pivot of a result set. All totals come from these numbers;
/// formatting happens on a separate display copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    entities: Vec<String>,
    rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// Flat column labels: `date`, one per entity, then `total`.
    ///
    /// Entity labels that would repeat a fixed column or an earlier label get
    /// ` (entity)` appended until unique. Values are still keyed by the raw
    /// entity name.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![DATE_COLUMN.to_string()];
        let mut taken: BTreeSet<String> = [DATE_COLUMN, TOTAL_COLUMN]
            .iter()
            .map(|c| c.to_lowercase())
            .collect();

        for entity in &self.entities {
            let mut label = entity.clone();
            while taken.contains(&label.to_lowercase()) {
                label.push_str(" (entity)");
            }
            taken.insert(label.to_lowercase());
            header.push(label);
        }

        header.push(TOTAL_COLUMN.to_string());
        header
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, date: NaiveDate, entity: &str) -> f64 {
        self.rows
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .and_then(|idx| self.rows[idx].values.get(entity).copied())
            .unwrap_or(0.0)
    }

    /// Column sums per entity.
    pub fn entity_totals(&self) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, f64> =
            self.entities.iter().map(|e| (e.clone(), 0.0)).collect();
        for row in &self.rows {
            for (entity, value) in &row.values {
                *totals.entry(entity.clone()).or_insert(0.0) += value;
            }
        }
        totals
    }

    pub fn grand_total(&self) -> f64 {
        self.rows.iter().map(|r| r.total).sum()
    }
}

pub fn summarize(points: &[ForecastPoint]) -> SummaryTable {
    let entities: BTreeSet<&str> = points.iter().map(|p| p.entity.as_str()).collect();

    let mut grid: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
    for point in points {
        let row = grid.entry(point.date).or_insert_with(|| {
            entities.iter().map(|e| (e.to_string(), 0.0)).collect()
        });
        *row.entry(point.entity.clone()).or_insert(0.0) += point.predicted_value;
    }

    let rows = grid
        .into_iter()
        .map(|(date, values)| {
            let total = values.values().sum();
            SummaryRow {
                date,
                values,
                total,
            }
        })
        .collect();

    SummaryTable {
        entities: entities.into_iter().map(str::to_string).collect(),
        rows,
    }
}
