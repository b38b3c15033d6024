//! One-shot commands: refresh prices and render the portfolio.

use anyhow::Result;
use comfy_table::Cell;

use super::ui;
use crate::core::portfolio::Holding;
use crate::monitor::MonitorStatus;
use crate::providers::FallbackAggregator;

pub fn render_holdings(holdings: &[Holding]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Name"),
        ui::header_cell("Qty"),
        ui::header_cell("Avg Cost"),
        ui::header_cell("Price"),
        ui::header_cell("P/L"),
        ui::header_cell("Return"),
    ]);

    for holding in holdings {
        let return_rate = holding.return_rate();
        table.add_row(vec![
            Cell::new(&holding.symbol),
            Cell::new(&holding.name),
            Cell::new(holding.quantity),
            ui::money_cell(holding.average_cost),
            ui::money_cell(holding.current_price),
            ui::signed_cell(holding.profit_loss, format!("{:+.0}", holding.profit_loss)),
            ui::signed_cell(return_rate, format!("{return_rate:+.2}%")),
        ]);
    }

    let total_value: f64 = holdings.iter().map(|h| h.market_value).sum();
    let total_pl: f64 = holdings.iter().map(|h| h.profit_loss).sum();
    format!(
        "{}\n\n{} {}  {} {}",
        table,
        ui::style_text("Market value:", ui::StyleType::TotalLabel),
        ui::style_text(&format!("{total_value:.0}"), ui::StyleType::TotalValue),
        ui::style_text("P/L:", ui::StyleType::TotalLabel),
        ui::style_text(&format!("{total_pl:+.0}"), ui::StyleType::TotalValue),
    )
}

/// Fetches a fresh price for every holding and renders the result. Rows
/// without a quote keep their last known price.
pub async fn refresh_and_render(
    holdings: &mut [Holding],
    aggregator: &FallbackAggregator,
) -> Result<String> {
    let pb = ui::new_progress_bar(holdings.len() as u64);
    pb.set_message("Fetching quotes");

    let mut missed = 0usize;
    for holding in holdings.iter_mut() {
        match aggregator.get_quote(&holding.symbol).await {
            Some(quote) => holding.apply_price(quote.price),
            None => missed += 1,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mut output = render_holdings(holdings);
    if missed > 0 {
        output.push('\n');
        output.push_str(&ui::style_text(
            &format!("{missed} symbol(s) had no quote"),
            ui::StyleType::Error,
        ));
    }
    Ok(output)
}

pub fn render_status(status: &MonitorStatus) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Setting"), ui::header_cell("Value")]);
    table.add_row(vec![
        Cell::new("Monitoring"),
        Cell::new(if status.running { "running" } else { "stopped" }),
    ]);
    table.add_row(vec![
        Cell::new("Check interval"),
        Cell::new(format!("{} min", status.check_interval.as_secs() / 60)),
    ]);
    table.add_row(vec![
        Cell::new("Market"),
        Cell::new(if status.market_open { "open" } else { "closed" }),
    ]);
    table.add_row(vec![
        Cell::new("Strategies"),
        Cell::new(status.strategy_count),
    ]);
    table.add_row(vec![Cell::new("Holdings"), Cell::new(status.holding_count)]);
    table.add_row(vec![
        Cell::new("Watchlist"),
        Cell::new(status.watchlist_count),
    ]);
    table.to_string()
}
