use super::ui;
use crate::core::price::HistoryRange;
use crate::pipeline::Pipeline;
use anyhow::Result;
use comfy_table::Cell;

pub fn run(pipeline: &Pipeline, code: &str, range: HistoryRange) -> Result<()> {
    let history = pipeline.history(code, range)?;
    println!(
        "\n{} {} ({}), last {}",
        ui::paint(&history.currency.code, ui::Tone::Heading),
        history.currency.name,
        history.currency.converter,
        history.range
    );

    if history.prices.is_empty() {
        println!(
            "{}",
            ui::paint("No prices in this range.", ui::Tone::Muted)
        );
        return Ok(());
    }

    let mut table = ui::table_with_headers(&["Date", "Average price", "Trend"]);
    for (i, price) in history.prices.iter().enumerate() {
        let trend = history.trend.as_ref().and_then(|t| t.get(i).copied());
        table.add_row(vec![
            Cell::new(price.date),
            ui::number_cell(format!("{:.4}", price.price)),
            ui::optional_number_cell(trend, |v| format!("{v:.4}")),
        ]);
    }
    println!("{table}");
    Ok(())
}
