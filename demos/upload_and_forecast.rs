use channel_sales_forecast::*;
use chrono::NaiveDate;

const JANUARY_UPLOAD: &str = "\
January channel sales,,
Date,Online,Bookstore,Wholesale
2025-01-02,120000,,450000
2025-01-03,135000,,
2025-01-06,128000,,
2025-01-07,142000,,380000
2025-01-31,,2100000,
";

const FEBRUARY_UPLOAD: &str = "\
February channel sales,,
Date,Online,Bookstore,Wholesale
2025-01-07,140000,,
2025-02-03,150000,,
2025-02-04,147000,,410000
2025-02-28,,2350000,
";

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("📊 Channel Sales Forecast Demo\n");

    let config = ForecastConfig {
        spread_policy: SpreadPolicy::WeekdaysOnly,
        ..ForecastConfig::default().with_strategy("Bookstore", Strategy::MonthlyAggregate)
    };
    let session = ForecastSession::new(config)?;

    for (label, upload) in [("January", JANUARY_UPLOAD), ("February", FEBRUARY_UPLOAD)] {
        let report = session.upload_csv(upload.as_bytes())?;
        println!(
            "  {} upload: {} new, {} replaced",
            label, report.inserted, report.replaced
        );
    }

    let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
    let report = session.report(start, end)?;

    for skipped in &report.run.skipped {
        println!("  ⚠️  {} skipped: {}", skipped.entity, skipped.reason);
    }

    let shown = report.summary.display(&DisplayOptions {
        currency_label: Some("KRW".to_string()),
        ..Default::default()
    });

    println!("\n{}", shown.header.join("\t"));
    for row in shown.rows.iter().take(10) {
        println!("{}", row.join("\t"));
    }
    println!("... ({} rows)\n", shown.rows.len());

    for (entity, total) in &shown.entity_totals {
        println!("  {}: {}", entity, total);
    }
    println!("✅ Grand total: {}", shown.grand_total);

    let csv = summary_csv(&report.summary, &CsvOptions { byte_order_mark: true })?;
    std::fs::write("forecast_summary.csv", csv)?;
    println!("\n💾 Wrote forecast_summary.csv");

    Ok(())
}
