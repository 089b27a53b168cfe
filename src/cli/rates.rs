use super::ui;
use crate::core::query::{COLUMNS, RateQueryService, RateRow, Selection};
use crate::core::rate::format_units;
use anyhow::{Context, Result};
use comfy_table::Cell;

const NO_DATA: &str = "No exchange rate data available, try again later";

/// Renders rows as a table, highlighting the `preferred` currency.
pub fn display_as_table(rows: &[RateRow], preferred: Option<&str>) -> String {
    let mut table = ui::new_styled_table();
    // Row ids are internal
    table.set_header(
        COLUMNS
            .iter()
            .filter(|column| **column != "id")
            .map(|column| ui::header_cell(column))
            .collect::<Vec<_>>(),
    );

    for row in rows {
        let highlight = preferred == Some(row.currency_code.as_str());
        table.add_row(vec![
            Cell::new(&row.currency_code),
            ui::amount_cell(&format_units(row.rate), highlight),
            Cell::new(&row.source),
        ]);
    }

    format!(
        "{}\n\n{}",
        ui::style_text("Exchange Rates", ui::StyleType::Title),
        table
    )
}

async fn fetch(service: &RateQueryService, selection: &Selection) -> Option<Vec<RateRow>> {
    let pb = ui::new_spinner("Fetching exchange rates...");
    let rows = service.query(selection).await;
    pb.finish_and_clear();
    rows
}

/// Prints the rows for `selection`, as JSON when `json` is set.
pub async fn run(
    service: &RateQueryService,
    selection: &Selection,
    preferred: Option<&str>,
    json: bool,
) -> Result<()> {
    let rows = match fetch(service, selection).await {
        Some(rows) if !rows.is_empty() => rows,
        _ => {
            println!("{}", ui::style_text(NO_DATA, ui::StyleType::Error));
            return Ok(());
        }
    };

    if json {
        let output = serde_json::to_string_pretty(&rows).context("Failed to serialize rates")?;
        println!("{output}");
    } else {
        println!("{}", display_as_table(&rows, preferred));
        if let Selection::CurrencyCode(code) = selection
            && rows.iter().all(|row| &row.currency_code != code)
        {
            println!(
                "\n{}",
                ui::style_text(
                    &format!("No rate for {code}, showing fallback currency"),
                    ui::StyleType::Subtle
                )
            );
        }
    }
    Ok(())
}
