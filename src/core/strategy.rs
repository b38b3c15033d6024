//! Strategy definitions and validation.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use tracing::{error, warn};

pub const DEFAULT_MIN_SCORE: f64 = 0.6;
const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

/// How the three buy conditions combine into one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionMode {
    StrictAnd,
    AnyOne,
    AnyTwoOfThree,
    WeightedScore,
}

impl Default for ConditionMode {
    fn default() -> Self {
        ConditionMode::AnyTwoOfThree
    }
}

impl Display for ConditionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConditionMode::StrictAnd => "strict_and",
            ConditionMode::AnyOne => "any_one",
            ConditionMode::AnyTwoOfThree => "any_two_of_three",
            ConditionMode::WeightedScore => "weighted_score",
        };
        write!(f, "{label}")
    }
}

impl FromStr for ConditionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict_and" => Ok(ConditionMode::StrictAnd),
            "any_one" => Ok(ConditionMode::AnyOne),
            "any_two_of_three" => Ok(ConditionMode::AnyTwoOfThree),
            "weighted_score" => Ok(ConditionMode::WeightedScore),
            _ => Err(anyhow::anyhow!("Invalid condition mode: {s}")),
        }
    }
}

/// Buy thresholds. A minimum of 0 or an unbounded maximum disables that
/// condition; disabled conditions do not participate in any mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyConditions {
    #[serde(default)]
    pub dividend_yield_min: f64,
    #[serde(default = "unbounded")]
    pub per_max: f64,
    #[serde(default = "unbounded")]
    pub pbr_max: f64,
}

impl Default for BuyConditions {
    fn default() -> Self {
        BuyConditions {
            dividend_yield_min: 0.0,
            per_max: f64::INFINITY,
            pbr_max: f64::INFINITY,
        }
    }
}

impl BuyConditions {
    pub fn dividend_enabled(&self) -> bool {
        self.dividend_yield_min > 0.0
    }

    pub fn per_enabled(&self) -> bool {
        self.per_max > 0.0 && self.per_max.is_finite()
    }

    pub fn pbr_enabled(&self) -> bool {
        self.pbr_max > 0.0 && self.pbr_max.is_finite()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellConditions {
    /// Percent return that triggers a profit-taking alert.
    #[serde(default = "unbounded")]
    pub profit_target: f64,
    /// Percent return (negative) that triggers a stop-loss alert.
    #[serde(default = "neg_unbounded")]
    pub stop_loss: f64,
}

impl Default for SellConditions {
    fn default() -> Self {
        SellConditions {
            profit_target: f64::INFINITY,
            stop_loss: f64::NEG_INFINITY,
        }
    }
}

fn unbounded() -> f64 {
    f64::INFINITY
}

fn neg_unbounded() -> f64 {
    f64::NEG_INFINITY
}

/// Per-condition weights for `weighted_score` mode. Each weight is clamped
/// to [0, 1]; the sum is not required to be 1 (a warning is logged).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weights {
    #[serde(default = "default_dividend_weight")]
    pub dividend_weight: f64,
    #[serde(default = "default_per_weight")]
    pub per_weight: f64,
    #[serde(default = "default_pbr_weight")]
    pub pbr_weight: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Weights {
            dividend_weight: default_dividend_weight(),
            per_weight: default_per_weight(),
            pbr_weight: default_pbr_weight(),
        }
    }
}

fn default_dividend_weight() -> f64 {
    0.4
}

fn default_per_weight() -> f64 {
    0.3
}

fn default_pbr_weight() -> f64 {
    0.3
}

impl Weights {
    fn clamped(&self, strategy_name: &str) -> Weights {
        let clamp = |value: f64, label: &str| {
            let clamped = value.clamp(0.0, 1.0);
            if (clamped - value).abs() > f64::EPSILON {
                warn!(
                    strategy = strategy_name,
                    "{label} weight {value} clamped to {clamped}"
                );
            }
            clamped
        };
        Weights {
            dividend_weight: clamp(self.dividend_weight, "dividend"),
            per_weight: clamp(self.per_weight, "per"),
            pbr_weight: clamp(self.pbr_weight, "pbr"),
        }
    }

    fn sum(&self) -> f64 {
        self.dividend_weight + self.per_weight + self.pbr_weight
    }
}

/// Serde form of one strategy as it appears in the config file. The
/// condition mode stays a string here so one bad strategy fails alone
/// instead of failing the whole file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub buy_conditions: BuyConditions,
    #[serde(default)]
    pub sell_conditions: SellConditions,
    #[serde(default = "default_mode_str")]
    pub condition_mode: String,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default)]
    pub weights: Weights,
}

fn default_mode_str() -> String {
    ConditionMode::AnyTwoOfThree.to_string()
}

fn default_min_score() -> f64 {
    DEFAULT_MIN_SCORE
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            buy_conditions: BuyConditions::default(),
            sell_conditions: SellConditions::default(),
            condition_mode: default_mode_str(),
            min_score: DEFAULT_MIN_SCORE,
            weights: Weights::default(),
        }
    }
}

/// A validated strategy, ready for evaluation.
#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: String,
    pub buy_conditions: BuyConditions,
    pub sell_conditions: SellConditions,
    pub condition_mode: ConditionMode,
    pub min_score: f64,
    pub weights: Weights,
}

impl Strategy {
    pub fn from_config(name: &str, config: StrategyConfig) -> Result<Self> {
        let condition_mode = ConditionMode::from_str(&config.condition_mode)?;

        let buy = &config.buy_conditions;
        if buy.dividend_yield_min < 0.0 {
            bail!("dividend_yield_min must be >= 0");
        }
        if buy.per_max < 0.0 || buy.pbr_max < 0.0 {
            bail!("per_max and pbr_max must be >= 0");
        }

        let sell = &config.sell_conditions;
        if sell.profit_target <= 0.0 {
            bail!("profit_target must be > 0");
        }
        if sell.stop_loss >= 0.0 {
            bail!("stop_loss must be < 0");
        }

        let weights = config.weights.clamped(name);
        if condition_mode == ConditionMode::WeightedScore
            && (weights.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE
        {
            warn!(
                strategy = name,
                sum = weights.sum(),
                "weights do not sum to 1; using them as-is"
            );
        }

        Ok(Strategy {
            name: name.to_string(),
            buy_conditions: config.buy_conditions,
            sell_conditions: config.sell_conditions,
            condition_mode,
            min_score: config.min_score,
            weights,
        })
    }
}

/// Builds the strategy table from config, excluding (and logging) any
/// strategy that fails validation. Falls back to the built-in default
/// when nothing valid is configured.
pub fn load_strategies(configs: &HashMap<String, StrategyConfig>) -> HashMap<String, Strategy> {
    let mut strategies = HashMap::new();
    for (name, config) in configs {
        match Strategy::from_config(name, config.clone()) {
            Ok(strategy) => {
                strategies.insert(name.clone(), strategy);
            }
            Err(err) => {
                error!(strategy = %name, "Invalid strategy excluded: {err}");
            }
        }
    }

    if strategies.is_empty() {
        warn!("No valid strategies configured; using the built-in default");
        return default_strategies();
    }
    strategies
}

pub fn default_strategies() -> HashMap<String, Strategy> {
    let default = Strategy {
        name: "default_strategy".to_string(),
        buy_conditions: BuyConditions {
            dividend_yield_min: 1.0,
            per_max: 40.0,
            pbr_max: 4.0,
        },
        sell_conditions: SellConditions {
            profit_target: 8.0,
            stop_loss: -3.0,
        },
        condition_mode: ConditionMode::AnyTwoOfThree,
        min_score: DEFAULT_MIN_SCORE,
        weights: Weights::default(),
    };
    HashMap::from([(default.name.clone(), default)])
}
