use super::ui;
use crate::pipeline::Pipeline;
use anyhow::Result;
use comfy_table::Cell;

pub fn run(pipeline: &Pipeline, code: &str, horizon_days: u32) -> Result<()> {
    let result = pipeline.forecast(code, horizon_days)?;
    let forecast = &result.forecast;

    println!(
        "\n{} {}, {} day projection from {} recent prices",
        ui::paint(&result.currency.code, ui::Tone::Heading),
        result.currency.name,
        horizon_days,
        forecast.recent_points
    );
    println!(
        "{} {:+.6}  {} {:+.6}",
        ui::paint("Velocity:", ui::Tone::Key),
        forecast.average_velocity,
        ui::paint("Acceleration:", ui::Tone::Key),
        forecast.acceleration
    );

    let mut table = ui::table_with_headers(&["Date", "Forecast"]);
    for (date, value) in result.dates.iter().zip(&forecast.values) {
        table.add_row(vec![
            Cell::new(date),
            ui::number_cell(format!("{value:.4}")),
        ]);
    }
    println!("{table}");
    Ok(())
}
