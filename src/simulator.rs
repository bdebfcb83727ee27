//! Paper round simulator
//!
//! Stands in for the order/position simulator: given a candle window it
//! produces one [`PerformanceRecord`] plus the market status for the round.
//! Entries are split into slices with random slippage, the exit is a random
//! fluctuation off the last close, and fees are charged on both legs.
//!
//! Candle retrieval is not done here. Callers pass candles in, or the
//! simulator synthesizes a seeded random walk.

use crate::error::{EvolutionError, Result};
use crate::models::{AgentState, MarketRegimeInput, PerformanceRecord};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const MIN_CANDLES: usize = 5;
const ENTRY_SLICES: [f64; 3] = [0.25, 0.25, 0.5];
const EXIT_FLUCTUATION: (f64, f64) = (-0.07, 0.09);
const EXECUTION_DELAY_SECS: (f64, f64) = (0.3, 2.5);
const DELAY_COST_RATE: f64 = 0.0002;

pub const IND_CAPITAL_WIPEOUT: &str = "capital_wipeout";
pub const IND_SLIPPAGE_ANOMALY: &str = "slippage_anomaly";
pub const IND_HIGH_LATENCY: &str = "high_latency";
pub const IND_FLASH_CRASH: &str = "flash_crash";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Capital assigned to freshly generated agents
    #[serde(default = "default_capital")]
    pub capital: f64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    #[serde(default = "default_slippage_factor")]
    pub slippage_factor: f64,
    /// Candles synthesized when none are supplied
    #[serde(default = "default_candle_count")]
    pub candle_count: usize,
    #[serde(default = "default_start_price")]
    pub start_price: f64,
}

fn default_capital() -> f64 {
    crate::agent::DEFAULT_CAPITAL
}

fn default_fee_rate() -> f64 {
    0.001
}

fn default_slippage_factor() -> f64 {
    0.0015
}

fn default_candle_count() -> usize {
    60
}

fn default_start_price() -> f64 {
    1.0
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            capital: default_capital(),
            fee_rate: default_fee_rate(),
            slippage_factor: default_slippage_factor(),
            candle_count: default_candle_count(),
            start_price: default_start_price(),
        }
    }
}

/// Everything one simulated round hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub performance: PerformanceRecord,
    pub market: MarketRegimeInput,
}

/// Black-box producer of round results.
pub trait PerformanceSource {
    fn run_round(&mut self, agent: &AgentState, rng: &mut dyn RngCore) -> Result<RoundOutcome>;
}

#[derive(Debug, Clone, Default)]
pub struct PaperSimulator {
    config: SimulatorConfig,
    candles: Option<Vec<Candle>>,
}

impl PaperSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            candles: None,
        }
    }

    /// Use a fixed candle window instead of synthesizing one.
    pub fn with_candles(mut self, candles: Vec<Candle>) -> Self {
        self.candles = Some(candles);
        self
    }

    fn synthesize(&self, rng: &mut dyn RngCore) -> Vec<Candle> {
        let mut price = self.config.start_price;
        (0..self.config.candle_count)
            .map(|_| {
                let open = price;
                let close = open * (1.0 + rng.gen_range(-0.005..0.005));
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.002));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.002));
                price = close;
                Candle {
                    open,
                    high,
                    low,
                    close,
                }
            })
            .collect()
    }
}

impl PerformanceSource for PaperSimulator {
    fn run_round(&mut self, agent: &AgentState, rng: &mut dyn RngCore) -> Result<RoundOutcome> {
        let candles = match &self.candles {
            Some(candles) => candles.clone(),
            None => self.synthesize(rng),
        };
        if candles.len() < MIN_CANDLES {
            return Err(EvolutionError::InsufficientData {
                required: MIN_CANDLES,
                available: candles.len(),
            });
        }
        if candles.iter().any(|c| !(c.open > 0.0 && c.close > 0.0)) {
            return Err(EvolutionError::malformed("candles", "non-positive price"));
        }

        let capital = agent.capital;
        let execution_delay = rng.gen_range(EXECUTION_DELAY_SECS.0..EXECUTION_DELAY_SECS.1);

        let mut avg_entry_price = 0.0;
        let mut qty_total = 0.0;
        let mut slippage_total = 0.0;
        let mut cost_total = 0.0;
        for ratio in ENTRY_SLICES {
            let base_price = candles[rng.gen_range(0..candles.len())].open;
            let slip = base_price
                * rng.gen_range(-self.config.slippage_factor..=self.config.slippage_factor);
            let exec_price = base_price + slip;
            let notional = capital * ratio;
            qty_total += notional / exec_price;
            avg_entry_price += exec_price * ratio;
            slippage_total += slip.abs();
            cost_total += notional;
        }

        let real_cost_basis = cost_total / qty_total;
        let fee_entry = real_cost_basis * qty_total * self.config.fee_rate;

        let last_close = candles[candles.len() - 1].close;
        let fluctuation = rng.gen_range(EXIT_FLUCTUATION.0..EXIT_FLUCTUATION.1);
        let exit_price = last_close * (1.0 + fluctuation);
        let fee_exit = exit_price * qty_total * self.config.fee_rate;
        let net_value = qty_total * exit_price;

        let net_profit = net_value - cost_total - fee_entry - fee_exit;
        let return_pct = round_to(net_profit / capital * 100.0, 2);
        let delay_cost = execution_delay * qty_total * avg_entry_price * DELAY_COST_RATE;

        let mut fail_reason = None;
        let mut fail_indicators = BTreeSet::new();
        if return_pct < -85.0 {
            fail_reason = Some("simulated liquidation".to_string());
            fail_indicators.insert(IND_CAPITAL_WIPEOUT.to_string());
        }
        if slippage_total / avg_entry_price > 0.03 {
            fail_indicators.insert(IND_SLIPPAGE_ANOMALY.to_string());
        }
        if execution_delay > 2.0 {
            fail_indicators.insert(IND_HIGH_LATENCY.to_string());
        }
        if fluctuation < -0.06 {
            fail_reason = Some("flash crash wick".to_string());
            fail_indicators.insert(IND_FLASH_CRASH.to_string());
        }

        let performance = PerformanceRecord {
            return_pct,
            net_profit: round_to(net_profit, 4),
            drawdown: round_to((fluctuation * 100.0).abs(), 2),
            win_rate: round_to(rng.gen_range(55.0..92.0), 2),
            sharpe: round_to(rng.gen_range(0.8..2.3), 2),
            trade_count: rng.gen_range(8..=20),
            fail_reason,
            fail_indicators,
            entry_price: Some(round_to(avg_entry_price, 7)),
            exit_price: Some(round_to(exit_price, 7)),
            slippage_total: Some(round_to(slippage_total, 6)),
            delay_cost: Some(round_to(delay_cost, 4)),
        };

        let market = MarketRegimeInput::new(
            round_to(rng.gen_range(4.0..9.0), 2),
            round_to(rng.gen_range(0.2..0.9), 2),
        );

        Ok(RoundOutcome {
            performance,
            market,
        })
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
