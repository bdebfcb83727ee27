//! Shared data model: agent state, round performance and market status.
//!
//! These are plain value objects. They are passed between the memory,
//! grading and evolution components by argument and return value, and
//! serialized as JSON at the orchestration boundary.

use crate::error::{EvolutionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Named cluster of risk/reward parameter choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleProfile {
    Defensive,
    Explosive,
    Balanced,
    Scalper,
}

impl StyleProfile {
    pub const ALL: [StyleProfile; 4] = [
        StyleProfile::Defensive,
        StyleProfile::Explosive,
        StyleProfile::Balanced,
        StyleProfile::Scalper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StyleProfile::Defensive => "defensive",
            StyleProfile::Explosive => "explosive",
            StyleProfile::Balanced => "balanced",
            StyleProfile::Scalper => "scalper",
        }
    }

    /// Preset parameters the generator seeds a fresh agent with.
    pub fn preset(&self) -> StrategyParameters {
        let (ma_fast, ma_slow, sl_pct, tp_pct) = match self {
            StyleProfile::Defensive => (20.0, 60.0, 2.0, 4.0),
            StyleProfile::Explosive => (8.0, 21.0, 4.0, 10.0),
            StyleProfile::Scalper => (5.0, 13.0, 1.5, 2.5),
            StyleProfile::Balanced => (15.0, 45.0, 3.0, 6.0),
        };
        StrategyParameters {
            ma_fast,
            ma_slow,
            sl_pct,
            tp_pct,
        }
    }
}

impl fmt::Display for StyleProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emotional label attached to an agent. The first three are derived by the
/// evolution policy; the rest only appear on freshly generated agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalTendency {
    Anxious,
    Confident,
    Neutral,
    Greedy,
    Fearful,
    Hesitant,
    Balanced,
    Aggressive,
}

impl EmotionalTendency {
    /// Labels a generator may assign at creation time.
    pub const INITIAL: [EmotionalTendency; 5] = [
        EmotionalTendency::Greedy,
        EmotionalTendency::Fearful,
        EmotionalTendency::Hesitant,
        EmotionalTendency::Balanced,
        EmotionalTendency::Aggressive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionalTendency::Anxious => "anxious",
            EmotionalTendency::Confident => "confident",
            EmotionalTendency::Neutral => "neutral",
            EmotionalTendency::Greedy => "greedy",
            EmotionalTendency::Fearful => "fearful",
            EmotionalTendency::Hesitant => "hesitant",
            EmotionalTendency::Balanced => "balanced",
            EmotionalTendency::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for EmotionalTendency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anomaly labels accumulated on an agent across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadBehavior {
    HighDrawdown,
    Overtrading,
    EntryFailure,
    /// Near-zero returns with the same intent repeated; diagnostic only.
    Stagnation,
}

impl BadBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadBehavior::HighDrawdown => "high_drawdown",
            BadBehavior::Overtrading => "overtrading",
            BadBehavior::EntryFailure => "entry_failure",
            BadBehavior::Stagnation => "stagnation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParameters {
    pub ma_fast: f64,
    pub ma_slow: f64,
    pub sl_pct: f64,
    pub tp_pct: f64,
}

impl StrategyParameters {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("parameters.ma_fast", self.ma_fast),
            ("parameters.ma_slow", self.ma_slow),
            ("parameters.sl_pct", self.sl_pct),
            ("parameters.tp_pct", self.tp_pct),
        ] {
            require_positive(name, value)?;
        }
        if self.ma_fast >= self.ma_slow {
            return Err(EvolutionError::malformed(
                "parameters.ma_fast",
                format!("{} must be below ma_slow {}", self.ma_fast, self.ma_slow),
            ));
        }
        Ok(())
    }
}

/// Identity and mutable strategy configuration of one evolving agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: String,
    pub generation: u64,
    pub symbol: String,
    pub parameters: StrategyParameters,
    pub capital: f64,
    pub style_profile: StyleProfile,
    pub risk_tolerance: f64,
    pub init_bias_score: f64,
    pub temperature_level: f64,
    pub emotional_tendency: EmotionalTendency,
    pub decision_weighting_map: BTreeMap<String, f64>,
    #[serde(default)]
    pub evolution_intent: Vec<String>,
    #[serde(default)]
    pub bad_behavior_tag: BTreeSet<BadBehavior>,

    // Contextual fields stamped by the generator; evolution never touches them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genetic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_live_rounds: Option<u32>,
}

impl AgentState {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EvolutionError::malformed("id", "empty"));
        }
        if self.symbol.trim().is_empty() {
            return Err(EvolutionError::malformed("symbol", "empty"));
        }
        self.parameters.validate()?;
        require_positive("capital", self.capital)?;
        require_range("risk_tolerance", self.risk_tolerance, 0.0, 1.0)?;
        require_range("init_bias_score", self.init_bias_score, -1.0, 1.0)?;
        require_range("temperature_level", self.temperature_level, 0.0, 1.0)?;
        for (indicator, weight) in &self.decision_weighting_map {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(EvolutionError::malformed(
                    format!("decision_weighting_map.{}", indicator),
                    format!("weight {} must be finite and non-negative", weight),
                ));
            }
        }
        Ok(())
    }
}

/// One round's simulated trading outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub return_pct: f64,
    pub net_profit: f64,
    pub drawdown: f64,
    pub win_rate: f64,
    pub sharpe: f64,
    pub trade_count: u32,
    #[serde(default)]
    pub fail_reason: Option<String>,
    #[serde(default)]
    pub fail_indicators: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_cost: Option<f64>,
}

impl PerformanceRecord {
    /// Record with only the required fields set.
    pub fn new(
        return_pct: f64,
        net_profit: f64,
        drawdown: f64,
        win_rate: f64,
        sharpe: f64,
        trade_count: u32,
    ) -> Self {
        Self {
            return_pct,
            net_profit,
            drawdown,
            win_rate,
            sharpe,
            trade_count,
            fail_reason: None,
            fail_indicators: BTreeSet::new(),
            entry_price: None,
            exit_price: None,
            slippage_total: None,
            delay_cost: None,
        }
    }

    pub fn with_fail_indicators<I, S>(mut self, indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_indicators = indicators.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_finite("return_pct", self.return_pct)?;
        require_finite("net_profit", self.net_profit)?;
        require_finite("sharpe", self.sharpe)?;
        require_range("drawdown", self.drawdown, 0.0, f64::MAX)?;
        require_range("win_rate", self.win_rate, 0.0, 100.0)?;
        Ok(())
    }
}

/// Market status as emitted by the simulator.
///
/// Both fields are optional on the wire: a missing value classifies as a
/// stable market rather than being guessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketRegimeInput {
    #[serde(default)]
    pub btc_volatility: Option<f64>,
    #[serde(default)]
    pub trend_score: Option<f64>,
}

impl MarketRegimeInput {
    pub fn new(btc_volatility: f64, trend_score: f64) -> Self {
        Self {
            btc_volatility: Some(btc_volatility),
            trend_score: Some(trend_score),
        }
    }
}

fn require_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EvolutionError::malformed(field, format!("{} is not finite", value)))
    }
}

fn require_positive(field: &str, value: f64) -> Result<()> {
    require_finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(EvolutionError::malformed(field, format!("{} must be positive", value)))
    }
}

fn require_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    require_finite(field, value)?;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(EvolutionError::malformed(
            field,
            format!("{} outside [{}, {}]", value, min, max),
        ))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn agent() -> AgentState {
        let mut weights = BTreeMap::new();
        weights.insert("RSI".to_string(), 0.4);
        weights.insert("MACD".to_string(), 0.3);
        weights.insert("MA".to_string(), 0.3);

        AgentState {
            id: "king".to_string(),
            generation: 0,
            symbol: "SHIBUSDT".to_string(),
            parameters: StyleProfile::Balanced.preset(),
            capital: 70.51,
            style_profile: StyleProfile::Balanced,
            risk_tolerance: 0.1,
            init_bias_score: 0.2,
            temperature_level: 0.5,
            emotional_tendency: EmotionalTendency::Balanced,
            decision_weighting_map: weights,
            evolution_intent: Vec::new(),
            bad_behavior_tag: BTreeSet::new(),
            strategy_type: Some("MA_Crossover".to_string()),
            strategy_theme: None,
            genetic_id: None,
            creation_id: None,
            training_trace_id: None,
            created_by: None,
            max_live_rounds: None,
        }
    }

    pub fn record(return_pct: f64, drawdown: f64) -> PerformanceRecord {
        PerformanceRecord::new(return_pct, return_pct * 0.7, drawdown, 65.0, 1.2, 12)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_valid_agent_passes() {
        assert!(agent().validate().is_ok());
    }

    #[test]
    fn test_inverted_moving_averages_rejected() {
        let mut a = agent();
        a.parameters.ma_fast = 50.0;
        let err = a.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_record_domain_checks() {
        assert!(record(1.0, 2.0).validate().is_ok());

        let mut r = record(1.0, 2.0);
        r.win_rate = 120.0;
        assert!(r.validate().is_err());

        let mut r = record(1.0, 2.0);
        r.drawdown = -0.5;
        assert!(r.validate().is_err());

        let mut r = record(f64::NAN, 2.0);
        r.drawdown = 1.0;
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_missing_required_field_fails_to_parse() {
        let json = r#"{
            "return_pct": 1.0,
            "net_profit": 0.5,
            "drawdown": 1.0,
            "win_rate": 50.0,
            "sharpe": 1.0
        }"#;
        let parsed: std::result::Result<PerformanceRecord, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_wire_labels() {
        let json = serde_json::to_string(&StyleProfile::Scalper).unwrap();
        assert_eq!(json, "\"scalper\"");
        let json = serde_json::to_string(&BadBehavior::HighDrawdown).unwrap();
        assert_eq!(json, "\"high_drawdown\"");
    }
}
