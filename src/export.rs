//! CSV byte streams and formatted display copies.
//!
//! Everything here reads the numeric tables and never writes back, so totals
//! are always summed before any separator or currency label is applied.

use crate::error::{ForecastError, Result};
use crate::orchestrator::ForecastRun;
use crate::summary::SummaryTable;
use serde::Serialize;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    /// Prefix a UTF-8 byte-order mark so spreadsheet tools detect the encoding.
    pub byte_order_mark: bool,
}

#[derive(Debug, Clone)]
pub struct DisplayOptions {
    pub thousands_separator: char,
    /// Appended to totals, e.g. "KRW" or "원".
    pub currency_label: Option<String>,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            thousands_separator: ',',
            currency_label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub entity_totals: Vec<(String, String)>,
    pub grand_total: String,
}

/// Whole-unit amount with grouped thousands.
pub fn format_amount(amount: f64, separator: char) -> String {
    let rounded = amount.round();
    let whole = rounded.abs() as u64;
    let sign = if rounded < 0.0 { "-" } else { "" };

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(ch);
    }

    format!("{}{}", sign, grouped)
}

fn with_label(amount: String, options: &DisplayOptions) -> String {
    match &options.currency_label {
        Some(label) => format!("{} {}", amount, label),
        None => amount,
    }
}

impl SummaryTable {
    pub fn display(&self, options: &DisplayOptions) -> DisplayTable {
        let sep = options.thousands_separator;

        let header = self.header();

        let rows = self
            .rows()
            .iter()
            .map(|row| {
                let mut cells = vec![row.date.format("%Y-%m-%d").to_string()];
                cells.extend(
                    self.entities()
                        .iter()
                        .map(|e| format_amount(row.values.get(e).copied().unwrap_or(0.0), sep)),
                );
                cells.push(format_amount(row.total, sep));
                cells
            })
            .collect();

        let entity_totals = self
            .entity_totals()
            .into_iter()
            .map(|(entity, total)| (entity, with_label(format_amount(total, sep), options)))
            .collect();

        DisplayTable {
            header,
            rows,
            entity_totals,
            grand_total: with_label(format_amount(self.grand_total(), sep), options),
        }
    }
}

fn finish(writer: csv::Writer<Vec<u8>>, options: &CsvOptions) -> Result<Vec<u8>> {
    let body = writer
        .into_inner()
        .map_err(|e| ForecastError::IoError(e.into_error()))?;

    if options.byte_order_mark {
        let mut out = Vec::with_capacity(UTF8_BOM.len() + body.len());
        out.extend_from_slice(UTF8_BOM);
        out.extend_from_slice(&body);
        Ok(out)
    } else {
        Ok(body)
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One line per point: `date,entity,predicted_value,is_actual,lower_bound,upper_bound`.
pub fn result_set_csv(run: &ForecastRun, options: &CsvOptions) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "date",
        "entity",
        "predicted_value",
        "is_actual",
        "lower_bound",
        "upper_bound",
    ])?;

    for p in &run.points {
        writer.write_record([
            p.date.format("%Y-%m-%d").to_string(),
            p.entity.clone(),
            p.predicted_value.to_string(),
            p.is_actual.to_string(),
            optional(p.lower_bound),
            optional(p.upper_bound),
        ])?;
    }

    finish(writer, options)
}

/// The pivot with raw numbers: `date,<entity...>,total`, labelled by
/// [`SummaryTable::header`].
pub fn summary_csv(table: &SummaryTable, options: &CsvOptions) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(table.header())?;

    for row in table.rows() {
        let mut record = vec![row.date.format("%Y-%m-%d").to_string()];
        record.extend(
            table
                .entities()
                .iter()
                .map(|e| row.values.get(e).copied().unwrap_or(0.0).to_string()),
        );
        record.push(row.total.to_string());
        writer.write_record(&record)?;
    }

    finish(writer, options)
}
