//! Wide-table upload loading.
//!
//! Uploads arrive as one sheet per reporting period: a date column plus one
//! column per channel. The loader melts that layout into [`Observation`]s.

use crate::error::{ForecastError, Result};
use crate::schema::{LoaderSettings, Observation};
use crate::utils::{parse_amount, parse_date};
use log::{debug, warn};
use std::io::Read;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedTable {
    pub observations: Vec<Observation>,
    /// Non-empty cells that could not be read as a number.
    pub dropped_cells: usize,
}

pub struct WideTableLoader {
    settings: LoaderSettings,
}

impl WideTableLoader {
    pub fn new(settings: LoaderSettings) -> Self {
        Self { settings }
    }

    pub fn load_bytes(&self, bytes: &[u8]) -> Result<LoadedTable> {
        self.load(bytes)
    }

    pub fn load<R: Read>(&self, reader: R) -> Result<LoadedTable> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = csv_reader
            .records()
            .skip(self.settings.header_skip_rows);

        let header = match records.next() {
            Some(row) => row?,
            None => {
                return Err(ForecastError::MissingDateColumn {
                    hints: self.settings.date_column_hints.join(", "),
                })
            }
        };

        let columns: Vec<String> = header
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let date_idx = self.find_date_column(&columns)?;
        debug!(
            "Using column '{}' as date column ({} entity columns)",
            columns[date_idx],
            columns.len().saturating_sub(1)
        );

        let mut table = LoadedTable::default();

        for (row_no, row) in records.enumerate() {
            let row = row?;

            let raw_date = row.get(date_idx).unwrap_or("");
            if raw_date.is_empty() {
                continue;
            }
            let date = parse_date(raw_date).map_err(|e| {
                ForecastError::DateError(format!("Data row {}: {}", row_no + 1, e))
            })?;

            for (idx, entity) in columns.iter().enumerate() {
                if idx == date_idx || entity.is_empty() {
                    continue;
                }

                let cell = row.get(idx).unwrap_or("");
                if cell.is_empty() {
                    continue;
                }

                match parse_amount(cell) {
                    Some(value) => {
                        let value = if self.settings.round_values {
                            value.round()
                        } else {
                            value
                        };
                        table
                            .observations
                            .push(Observation::new(entity.as_str(), date, value));
                    }
                    None => table.dropped_cells += 1,
                }
            }
        }

        if table.dropped_cells > 0 {
            warn!(
                "Dropped {} non-numeric cells while loading upload",
                table.dropped_cells
            );
        }

        Ok(table)
    }

    fn find_date_column(&self, columns: &[String]) -> Result<usize> {
        let hints: Vec<String> = self
            .settings
            .date_column_hints
            .iter()
            .map(|h| h.to_lowercase())
            .collect();

        columns
            .iter()
            .position(|col| {
                let lower = col.to_lowercase();
                hints.iter().any(|h| lower.contains(h.as_str()))
            })
            .ok_or_else(|| ForecastError::MissingDateColumn {
                hints: self.settings.date_column_hints.join(", "),
            })
    }
}

impl Default for WideTableLoader {
    fn default() -> Self {
        Self::new(LoaderSettings::default())
    }
}
