//! Buy/sell condition evaluation against a strategy.

use tracing::debug;

use crate::core::alert::{Alert, AlertKind};
use crate::core::portfolio::Holding;
use crate::core::quote::{DividendInfo, Quote};
use crate::core::strategy::{ConditionMode, Strategy};

struct ConditionScore {
    enabled: bool,
    satisfied: bool,
    reason: Option<String>,
}

impl ConditionScore {
    fn disabled() -> Self {
        ConditionScore {
            enabled: false,
            satisfied: false,
            reason: None,
        }
    }

    fn score(&self) -> u32 {
        u32::from(self.satisfied)
    }
}

fn score_dividend(yield_percent: f64, min_yield: f64, enabled: bool) -> ConditionScore {
    if !enabled {
        return ConditionScore::disabled();
    }
    let satisfied = yield_percent >= min_yield;
    ConditionScore {
        enabled: true,
        satisfied,
        reason: satisfied
            .then(|| format!("dividend yield {yield_percent:.2}% >= {min_yield}%")),
    }
}

fn score_per(per: Option<f64>, max_per: f64, enabled: bool) -> ConditionScore {
    if !enabled {
        return ConditionScore::disabled();
    }
    let per = per.unwrap_or(0.0);
    let satisfied = per > 0.0 && per <= max_per;
    ConditionScore {
        enabled: true,
        satisfied,
        reason: satisfied.then(|| format!("P/E {per:.1} <= {max_per}")),
    }
}

fn score_pbr(pbr: Option<f64>, max_pbr: f64, enabled: bool) -> ConditionScore {
    if !enabled {
        return ConditionScore::disabled();
    }
    let pbr = pbr.unwrap_or(0.0);
    let satisfied = pbr > 0.0 && pbr <= max_pbr;
    ConditionScore {
        enabled: true,
        satisfied,
        reason: satisfied.then(|| format!("P/B {pbr:.1} <= {max_pbr}")),
    }
}

fn signal_fires(strategy: &Strategy, scores: &[&ConditionScore; 3]) -> bool {
    let total: u32 = scores.iter().map(|c| c.score()).sum();
    match strategy.condition_mode {
        ConditionMode::StrictAnd => {
            let enabled = scores.iter().filter(|c| c.enabled).count();
            enabled > 0 && scores.iter().all(|c| !c.enabled || c.satisfied)
        }
        ConditionMode::AnyOne => total >= 1,
        ConditionMode::AnyTwoOfThree => total >= 2,
        ConditionMode::WeightedScore => {
            let weights = &strategy.weights;
            let weighted = f64::from(scores[0].score()) * weights.dividend_weight
                + f64::from(scores[1].score()) * weights.per_weight
                + f64::from(scores[2].score()) * weights.pbr_weight;
            weighted >= strategy.min_score
        }
    }
}

/// Evaluates the buy conditions of one strategy against a quote. Returns
/// the alert to raise, or `None` when the combination mode is not
/// satisfied.
pub fn evaluate_buy(
    quote: &Quote,
    dividend_info: &DividendInfo,
    strategy: &Strategy,
) -> Option<Alert> {
    let conditions = &strategy.buy_conditions;
    let dividend = score_dividend(
        dividend_info.yield_percent,
        conditions.dividend_yield_min,
        conditions.dividend_enabled(),
    );
    let per = score_per(quote.per, conditions.per_max, conditions.per_enabled());
    let pbr = score_pbr(quote.pbr, conditions.pbr_max, conditions.pbr_enabled());

    if !signal_fires(strategy, &[&dividend, &per, &pbr]) {
        debug!(symbol = %quote.symbol, strategy = %strategy.name, "Buy conditions not met");
        return None;
    }

    let reasons: Vec<String> = [dividend.reason, per.reason, pbr.reason]
        .into_iter()
        .flatten()
        .collect();
    let message = format!(
        "Buy signal: {} ({})\nPrice: {:.0}\nStrategy: {} ({})\nReasons: {}",
        quote.name,
        quote.symbol,
        quote.price,
        strategy.name,
        strategy.condition_mode,
        reasons.join(", ")
    );
    Some(Alert::new(
        &quote.symbol,
        AlertKind::Buy,
        message,
        quote.price,
        &strategy.name,
    ))
}

/// Evaluates the sell conditions against a holding's return rate.
/// Profit-taking and stop-loss are checked in that order; thresholds left
/// unbounded never fire.
pub fn evaluate_sell(holding: &Holding, quote: &Quote, strategy: &Strategy) -> Option<Alert> {
    let conditions = &strategy.sell_conditions;
    let return_rate = if holding.average_cost > 0.0 {
        (quote.price / holding.average_cost - 1.0) * 100.0
    } else {
        0.0
    };

    if return_rate >= conditions.profit_target {
        let message = format!(
            "Take-profit signal: {} ({})\nPrice: {:.0}\nReturn: {:+.2}% (target: {}%)",
            quote.name, quote.symbol, quote.price, return_rate, conditions.profit_target
        );
        return Some(Alert::new(
            &quote.symbol,
            AlertKind::SellProfit,
            message,
            quote.price,
            &strategy.name,
        ));
    }

    if return_rate <= conditions.stop_loss {
        let message = format!(
            "Stop-loss signal: {} ({})\nPrice: {:.0}\nReturn: {:+.2}% (limit: {}%)",
            quote.name, quote.symbol, quote.price, return_rate, conditions.stop_loss
        );
        return Some(Alert::new(
            &quote.symbol,
            AlertKind::SellLoss,
            message,
            quote.price,
            &strategy.name,
        ));
    }

    None
}
