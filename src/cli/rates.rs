use super::ui;
use crate::core::model::Currency;
use crate::pipeline::Pipeline;
use anyhow::Result;
use comfy_table::Cell;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Shows every stored currency with its latest average price.
pub fn run(pipeline: &Pipeline) -> Result<()> {
    let mut tables = pipeline.tables()?;
    let currencies = pipeline.currencies()?;
    if currencies.is_empty() {
        println!("No exchange rates stored yet. Run `fxtrend sync` first.");
        return Ok(());
    }

    tables.sort_by_key(|t| t.label);
    for table in &tables {
        println!(
            "{} {} published {}{}",
            ui::paint("Table", ui::Tone::Key),
            ui::paint(table.label.as_str(), ui::Tone::Highlight),
            table.publication_date,
            table
                .table_number
                .as_deref()
                .map(|n| format!(" ({n})"))
                .unwrap_or_default()
        );
    }

    let mut output = ui::table_with_headers(&[
        "Code",
        "Currency",
        "Units",
        "Date",
        "Average price",
        "Change",
    ]);

    for currency in &currencies {
        let latest = currency.latest_price();
        output.add_row(vec![
            Cell::new(&currency.code),
            Cell::new(&currency.name),
            ui::number_cell(currency.converter),
            ui::optional_number_cell(latest, |p| p.date.to_string()),
            ui::optional_number_cell(latest, |p| format!("{:.4}", p.price)),
            ui::change_cell(last_change(currency)),
        ]);
    }
    println!("{output}");
    Ok(())
}

/// Percentage change between the two most recent prices.
fn last_change(currency: &Currency) -> Option<f64> {
    let [.., previous, latest] = currency.prices() else {
        return None;
    };
    if previous.price == Decimal::ZERO {
        return None;
    }
    ((latest.price - previous.price) / previous.price * Decimal::ONE_HUNDRED).to_f64()
}
