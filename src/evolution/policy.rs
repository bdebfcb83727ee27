//! Evolution policy: turns one round's grade, regime and performance into
//! the next agent state.
//!
//! The policy is a pure function of its inputs plus an injected random
//! source. Mutation magnitude grows as the grade worsens:
//!
//! | grade | regime step | grade step                                   |
//! |-------|-------------|----------------------------------------------|
//! | S+    | skipped     | skipped (frozen)                             |
//! | A     | applied     | deterministic ±5% nudge on TP/SL             |
//! | B     | applied     | random ±10% on TP/SL, risk walk ±0.05        |
//! | C     | applied     | random reset of TP, SL, risk; style resample |

use crate::error::Result;
use crate::evolution::grading::{Grade, GradeResult};
use crate::evolution::memory::{EvolutionEvent, MemoryStore, StyleChange};
use crate::evolution::regime::RegimeType;
use crate::models::{AgentState, BadBehavior, EmotionalTendency, PerformanceRecord, StyleProfile};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const FROZEN_INTENT: &str = "frozen: at target performance";
/// Logged when a non-frozen round records no other intent. The regime and
/// grade steps each log a line today, so this only shows up if one of them
/// is made silent.
pub const NO_ACTION_INTENT: &str = "no specific evolutionary action occurred this round";

const TREND_TP_MULTIPLIER: f64 = 1.10;
const SIDEWAY_SL_MULTIPLIER: f64 = 0.90;
const VOLATILE_RISK_STEP: f64 = 0.05;

const A_NUDGE: f64 = 0.05;
const B_PERTURBATION: f64 = 0.10;
const B_RISK_WALK: f64 = 0.05;
const C_TP_RANGE: (f64, f64) = (2.0, 10.0);
const C_SL_RANGE: (f64, f64) = (1.0, 4.0);
const C_RISK_RANGE: (f64, f64) = (0.05, 0.2);

const INDICATOR_PENALTY: f64 = 0.9;

const BIAS_DRIFT: (f64, f64) = (-0.1, 0.1);
const TEMPERATURE_DRIFT: (f64, f64) = (-0.05, 0.1);

const HIGH_DRAWDOWN_PCT: f64 = 6.0;
const OVERTRADING_COUNT: u32 = 20;
const ENTRY_FAILURE_WIN_RATE: f64 = 30.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Tag agents whose returns stay flat while intent repeats
    #[serde(default = "default_detect_stagnation")]
    pub detect_stagnation: bool,
    /// Rounds inspected by stagnation detection
    #[serde(default = "default_stagnation_window")]
    pub stagnation_window: usize,
}

fn default_detect_stagnation() -> bool {
    true
}

fn default_stagnation_window() -> usize {
    3
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            detect_stagnation: true,
            stagnation_window: 3,
        }
    }
}

/// Result of one evolution step.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionOutcome {
    pub agent: AgentState,
    pub regime: RegimeType,
    pub grade: Grade,
    pub frozen: bool,
    pub style_change: Option<(StyleProfile, StyleProfile)>,
    /// Applied to `init_bias_score` before clamping; zero when frozen
    pub bias_shift: f64,
    /// Applied to `temperature_level` before clamping; zero when frozen
    pub temperature_shift: f64,
}

impl EvolutionOutcome {
    pub fn intent(&self) -> &[String] {
        &self.agent.evolution_intent
    }

    /// Audit record of this step for the memory trace.
    pub fn event(&self) -> EvolutionEvent {
        EvolutionEvent {
            generation: self.agent.generation,
            regime: self.regime,
            grade: self.grade,
            frozen: self.frozen,
            style_change: self.style_change.map(|(from, to)| StyleChange { from, to }),
            emotion: self.agent.emotional_tendency,
            risk_tolerance: self.agent.risk_tolerance,
            bias_shift: self.bias_shift,
            temperature_shift: self.temperature_shift,
            intent: self.agent.evolution_intent.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvolutionPolicy {
    config: PolicyConfig,
}

impl EvolutionPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Produce the next agent state. Inputs are validated up front; on error
    /// nothing is returned, so callers never see a half-mutated agent.
    pub fn evolve<R: Rng>(
        &self,
        agent: &AgentState,
        record: &PerformanceRecord,
        regime: RegimeType,
        grade: &GradeResult,
        memory: &MemoryStore,
        rng: &mut R,
    ) -> Result<EvolutionOutcome> {
        agent.validate()?;
        record.validate()?;

        let mut next = agent.clone();
        next.generation += 1;

        next.emotional_tendency = derive_emotion(record);
        next.bad_behavior_tag.extend(derive_bad_behavior(record));
        if self.config.detect_stagnation && memory.is_stagnant(self.config.stagnation_window) {
            next.bad_behavior_tag.insert(BadBehavior::Stagnation);
        }

        if grade.grade == Grade::SPlus {
            next.evolution_intent = vec![FROZEN_INTENT.to_string()];
            return Ok(EvolutionOutcome {
                agent: next,
                regime,
                grade: grade.grade,
                frozen: true,
                style_change: None,
                bias_shift: 0.0,
                temperature_shift: 0.0,
            });
        }

        let mut intent = Vec::new();
        apply_regime(&mut next, regime, &mut intent);
        apply_grade_mutation(&mut next, grade.grade, rng, &mut intent);

        let mut penalized: BTreeSet<String> = memory.sealed_indicators();
        penalized.extend(record.fail_indicators.iter().cloned());
        for indicator in &penalized {
            if let Some(weight) = next.decision_weighting_map.get_mut(indicator) {
                let before = *weight;
                *weight *= INDICATOR_PENALTY;
                intent.push(format!(
                    "penalized failing indicator {}: weight {:.4} -> {:.4}",
                    indicator, before, *weight
                ));
            }
        }

        let bias_shift = round2(rng.gen_range(BIAS_DRIFT.0..BIAS_DRIFT.1));
        next.init_bias_score = round2((next.init_bias_score + bias_shift).clamp(-1.0, 1.0));
        let temperature_shift = rng.gen_range(TEMPERATURE_DRIFT.0..TEMPERATURE_DRIFT.1);
        next.temperature_level =
            round2((next.temperature_level + temperature_shift).clamp(0.0, 1.0));

        let style_change = if next.style_profile != agent.style_profile {
            intent.push(format!(
                "style changed: {} -> {}",
                agent.style_profile, next.style_profile
            ));
            Some((agent.style_profile, next.style_profile))
        } else {
            None
        };

        next.evolution_intent = finalize_intent(intent);

        Ok(EvolutionOutcome {
            agent: next,
            regime,
            grade: grade.grade,
            frozen: false,
            style_change,
            bias_shift,
            temperature_shift,
        })
    }
}

fn finalize_intent(mut intent: Vec<String>) -> Vec<String> {
    if intent.is_empty() {
        intent.push(NO_ACTION_INTENT.to_string());
    }
    intent
}

fn apply_regime(agent: &mut AgentState, regime: RegimeType, intent: &mut Vec<String>) {
    match regime {
        RegimeType::Trend => {
            agent.parameters.tp_pct *= TREND_TP_MULTIPLIER;
            agent.style_profile = StyleProfile::Explosive;
            intent.push(format!(
                "trend market: raised tp_pct to {:.3} and adopted explosive style",
                agent.parameters.tp_pct
            ));
        }
        RegimeType::Sideway => {
            agent.parameters.sl_pct *= SIDEWAY_SL_MULTIPLIER;
            agent.style_profile = StyleProfile::Defensive;
            intent.push(format!(
                "sideway market: tightened sl_pct to {:.3} and adopted defensive style",
                agent.parameters.sl_pct
            ));
        }
        RegimeType::Volatile => {
            agent.risk_tolerance = (agent.risk_tolerance + VOLATILE_RISK_STEP).clamp(0.0, 1.0);
            intent.push(format!(
                "volatile market: raised risk tolerance to {:.2}",
                agent.risk_tolerance
            ));
        }
        RegimeType::Stable => {
            intent.push("stable market: keeping current parameters and style".to_string());
        }
    }
}

fn apply_grade_mutation<R: Rng>(
    agent: &mut AgentState,
    grade: Grade,
    rng: &mut R,
    intent: &mut Vec<String>,
) {
    let params = &mut agent.parameters;
    match grade {
        // Handled by the freeze gate before any mutation.
        Grade::SPlus => {}
        Grade::A => {
            params.tp_pct *= 1.0 + A_NUDGE;
            params.sl_pct *= 1.0 - A_NUDGE;
            intent.push(format!(
                "grade A: nudged tp_pct to {:.3} and sl_pct to {:.3}",
                params.tp_pct, params.sl_pct
            ));
        }
        Grade::B => {
            params.tp_pct *= 1.0 + rng.gen_range(-B_PERTURBATION..=B_PERTURBATION);
            params.sl_pct *= 1.0 + rng.gen_range(-B_PERTURBATION..=B_PERTURBATION);
            let walk = rng.gen_range(-B_RISK_WALK..=B_RISK_WALK);
            agent.risk_tolerance = (agent.risk_tolerance + walk).clamp(0.0, 1.0);
            intent.push(format!(
                "grade B: perturbed tp_pct to {:.3}, sl_pct to {:.3}, risk tolerance to {:.2}",
                params.tp_pct, params.sl_pct, agent.risk_tolerance
            ));
        }
        Grade::C => {
            params.tp_pct = rng.gen_range(C_TP_RANGE.0..C_TP_RANGE.1);
            params.sl_pct = rng.gen_range(C_SL_RANGE.0..C_SL_RANGE.1);
            agent.risk_tolerance = rng.gen_range(C_RISK_RANGE.0..C_RISK_RANGE.1);
            if let Some(style) = StyleProfile::ALL.choose(rng) {
                agent.style_profile = *style;
            }
            intent.push(format!(
                "grade C: reset tp_pct to {:.3}, sl_pct to {:.3}, risk to {:.2}, style {}",
                params.tp_pct, params.sl_pct, agent.risk_tolerance, agent.style_profile
            ));
        }
    }
}

/// Emotional label derived from one round's performance.
pub fn derive_emotion(record: &PerformanceRecord) -> EmotionalTendency {
    if record.return_pct < 0.0 && record.drawdown > 3.0 {
        EmotionalTendency::Anxious
    } else if record.return_pct > 0.0 && record.win_rate > 60.0 {
        EmotionalTendency::Confident
    } else {
        EmotionalTendency::Neutral
    }
}

/// Anomalies visible in one round's performance.
pub fn derive_bad_behavior(record: &PerformanceRecord) -> BTreeSet<BadBehavior> {
    let mut tags = BTreeSet::new();
    if record.drawdown > HIGH_DRAWDOWN_PCT {
        tags.insert(BadBehavior::HighDrawdown);
    }
    if record.trade_count > OVERTRADING_COUNT {
        tags.insert(BadBehavior::Overtrading);
    }
    if record.win_rate < ENTRY_FAILURE_WIN_RATE {
        tags.insert(BadBehavior::EntryFailure);
    }
    tags
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
