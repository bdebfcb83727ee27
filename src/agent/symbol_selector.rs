//! Symbol selection: scores candidate tickers by volatility, liquidity and
//! how well the agent has done on them before.
//!
//! Ticker data is supplied by the caller; this module performs no I/O.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const VOLATILITY_WEIGHT: f64 = 0.5;
const VOLUME_WEIGHT: f64 = 0.3;
const MEMORY_WEIGHT: f64 = 0.2;

pub const DEFAULT_SYMBOLS: [&str; 2] = ["SHIBUSDT", "DOGEUSDT"];

/// 24h ticker statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerStats {
    pub symbol: String,
    pub high_price: f64,
    pub low_price: f64,
    /// Quote-currency volume
    pub quote_volume: f64,
}

impl TickerStats {
    /// Daily range as a percentage of the low. Zero when the low is not positive.
    pub fn volatility_pct(&self) -> f64 {
        if self.low_price > 0.0 {
            (self.high_price - self.low_price) / self.low_price * 100.0
        } else {
            0.0
        }
    }

    pub fn volume_millions(&self) -> f64 {
        self.quote_volume / 1_000_000.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolUsage {
    /// Times the selector picked this symbol
    pub uses: u64,
    pub avg_return: f64,
    /// Rounds folded into `avg_return`
    #[serde(default)]
    pub rounds: u64,
}

/// Per-symbol usage memory persisted between rounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolMemory(pub BTreeMap<String, SymbolUsage>);

impl SymbolMemory {
    pub fn with_symbols<'a>(symbols: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            symbols
                .into_iter()
                .map(|s| (s.to_string(), SymbolUsage::default()))
                .collect(),
        )
    }

    /// Fold one round's return into the running average for `symbol`.
    pub fn record_return(&mut self, symbol: &str, return_pct: f64) {
        let usage = self.0.entry(symbol.to_string()).or_default();
        usage.rounds += 1;
        usage.avg_return += (return_pct - usage.avg_return) / usage.rounds as f64;
    }

    /// Symbol used most often, ties broken alphabetically.
    pub fn most_used(&self) -> Option<&str> {
        self.0
            .iter()
            .max_by(|a, b| a.1.uses.cmp(&b.1.uses).then_with(|| b.0.cmp(a.0)))
            .map(|(symbol, _)| symbol.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolScore {
    pub symbol: String,
    pub volatility: f64,
    pub volume_m_usdt: f64,
    pub memory_score: f64,
    pub score: f64,
}

pub struct SymbolSelector;

impl SymbolSelector {
    /// Score every ticker, best first.
    pub fn rank(tickers: &[TickerStats], memory: &SymbolMemory) -> Vec<SymbolScore> {
        let mut scores: Vec<SymbolScore> = tickers
            .iter()
            .map(|t| {
                let volatility = t.volatility_pct();
                let volume = t.volume_millions();
                let memory_score = memory.0.get(&t.symbol).map(|u| u.avg_return).unwrap_or(0.0);
                SymbolScore {
                    symbol: t.symbol.clone(),
                    volatility,
                    volume_m_usdt: volume,
                    memory_score,
                    score: volatility * VOLATILITY_WEIGHT
                        + volume * VOLUME_WEIGHT
                        + memory_score * MEMORY_WEIGHT,
                }
            })
            .collect();
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        scores
    }

    /// Pick the best symbol and count the use.
    pub fn select(tickers: &[TickerStats], memory: &mut SymbolMemory) -> Option<String> {
        let best = Self::rank(tickers, memory).into_iter().next()?;
        memory.0.entry(best.symbol.clone()).or_default().uses += 1;
        Some(best.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, high: f64, low: f64, volume: f64) -> TickerStats {
        TickerStats {
            symbol: symbol.to_string(),
            high_price: high,
            low_price: low,
            quote_volume: volume,
        }
    }

    #[test]
    fn test_volatility_guards_zero_low() {
        assert_eq!(ticker("X", 1.0, 0.0, 0.0).volatility_pct(), 0.0);
        assert!((ticker("X", 1.1, 1.0, 0.0).volatility_pct() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_select_prefers_higher_score_and_counts_use() {
        let tickers = vec![
            ticker("SHIBUSDT", 1.05, 1.0, 20_000_000.0),
            ticker("DOGEUSDT", 1.20, 1.0, 10_000_000.0),
        ];
        let mut memory = SymbolMemory::with_symbols(DEFAULT_SYMBOLS);
        // SHIB: 5*0.5 + 20*0.3 = 8.5; DOGE: 20*0.5 + 10*0.3 = 13
        let chosen = SymbolSelector::select(&tickers, &mut memory).unwrap();
        assert_eq!(chosen, "DOGEUSDT");
        assert_eq!(memory.0["DOGEUSDT"].uses, 1);
        assert_eq!(memory.most_used(), Some("DOGEUSDT"));
    }

    #[test]
    fn test_memory_score_shifts_ranking() {
        let tickers = vec![
            ticker("SHIBUSDT", 1.10, 1.0, 0.0),
            ticker("DOGEUSDT", 1.10, 1.0, 0.0),
        ];
        let mut memory = SymbolMemory::with_symbols(DEFAULT_SYMBOLS);
        memory.0.get_mut("SHIBUSDT").unwrap().avg_return = 4.0;
        let ranked = SymbolSelector::rank(&tickers, &memory);
        assert_eq!(ranked[0].symbol, "SHIBUSDT");
    }

    #[test]
    fn test_empty_candidates() {
        let mut memory = SymbolMemory::default();
        assert_eq!(SymbolSelector::select(&[], &mut memory), None);
    }

    #[test]
    fn test_running_average() {
        let mut memory = SymbolMemory::default();
        memory.record_return("DOGEUSDT", 4.0);
        memory.record_return("DOGEUSDT", 2.0);
        memory.record_return("DOGEUSDT", 6.0);
        let usage = &memory.0["DOGEUSDT"];
        assert!((usage.avg_return - 4.0).abs() < 1e-9);
        assert_eq!(usage.rounds, 3);
        assert_eq!(usage.uses, 0);
    }
}
