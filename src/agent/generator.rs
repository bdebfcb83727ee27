//! Fresh agent generation from style presets.

use crate::models::{AgentState, EmotionalTendency, StyleProfile};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_CAPITAL: f64 = 70.51;
pub const INDICATOR_POOL: [&str; 5] = ["MA", "RSI", "Volume", "MACD", "PriceAction"];
const THEME_POOL: [&str; 3] = ["trend_following", "breakout", "mean_revert"];
const STRATEGY_TYPE: &str = "MA_Crossover";
const INDICATORS_PER_AGENT: usize = 3;

pub struct AgentGenerator {
    pub agent_id: String,
    pub capital: f64,
    pub max_live_rounds: u32,
}

impl Default for AgentGenerator {
    fn default() -> Self {
        Self {
            agent_id: "king".to_string(),
            capital: DEFAULT_CAPITAL,
            max_live_rounds: 10,
        }
    }
}

impl AgentGenerator {
    pub fn generate<R: Rng>(&self, symbol: &str, now: DateTime<Utc>, rng: &mut R) -> AgentState {
        let style = *StyleProfile::ALL
            .choose(rng)
            .unwrap_or(&StyleProfile::Balanced);

        let picked: Vec<&str> = INDICATOR_POOL
            .choose_multiple(rng, INDICATORS_PER_AGENT)
            .copied()
            .collect();
        let raw: Vec<f64> = picked.iter().map(|_| rng.gen_range(0.2..0.5)).collect();
        let total: f64 = raw.iter().sum();
        let decision_weighting_map: BTreeMap<String, f64> = picked
            .iter()
            .zip(&raw)
            .map(|(name, w)| (name.to_string(), round2(w / total)))
            .collect();

        let stamp = now.format("%Y%m%d%H%M%S").to_string();

        AgentState {
            id: self.agent_id.clone(),
            generation: 0,
            symbol: symbol.to_string(),
            parameters: style.preset(),
            capital: self.capital,
            style_profile: style,
            risk_tolerance: round2(rng.gen_range(0.05..0.2)),
            init_bias_score: round2(rng.gen_range(-1.0..=1.0)),
            temperature_level: round2(rng.gen_range(0.3..0.9)),
            emotional_tendency: *EmotionalTendency::INITIAL
                .choose(rng)
                .unwrap_or(&EmotionalTendency::Balanced),
            decision_weighting_map,
            evolution_intent: Vec::new(),
            bad_behavior_tag: BTreeSet::new(),
            strategy_type: Some(STRATEGY_TYPE.to_string()),
            strategy_theme: THEME_POOL.choose(rng).map(|t| t.to_string()),
            genetic_id: Some(genetic_id(symbol, &stamp)),
            creation_id: Some(format!("{}_{}", symbol, stamp)),
            training_trace_id: Some(format!("trace_{}", rng.gen_range(100_000..=999_999))),
            created_by: Some(format!("killcore_generator_v{}", env!("CARGO_PKG_VERSION"))),
            max_live_rounds: Some(self.max_live_rounds),
        }
    }
}

/// First 12 hex characters of SHA-256 over symbol and creation stamp.
pub fn genetic_id(symbol: &str, stamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(symbol.as_bytes());
    hasher.update(stamp.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_generated_agent_is_valid() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let agent = AgentGenerator::default().generate("DOGEUSDT", now, &mut rng);
            agent.validate().unwrap();
            assert_eq!(agent.generation, 0);
            assert_eq!(agent.parameters, agent.style_profile.preset());
            assert_eq!(agent.decision_weighting_map.len(), 3);
            let total: f64 = agent.decision_weighting_map.values().sum();
            assert!((total - 1.0).abs() < 0.02);
            assert_eq!(agent.creation_id.as_deref(), Some("DOGEUSDT_20250301120000"));
        }
    }

    #[test]
    fn test_genetic_id_is_stable() {
        let a = genetic_id("SHIBUSDT", "20250101000000");
        let b = genetic_id("SHIBUSDT", "20250101000000");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert_ne!(a, genetic_id("DOGEUSDT", "20250101000000"));
    }
}
