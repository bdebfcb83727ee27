//! Depth-bounded round memory with unbounded audit aggregates.
//!
//! `history` is trimmed FIFO to the configured depth so recency-weighted
//! scoring only sees the short-term window. `fail_indicators_count`,
//! `memory_flags` and `evolution_trace` span every round ever appended and
//! are never truncated.

use crate::error::{EvolutionError, Result};
use crate::evolution::grading::Grade;
use crate::evolution::regime::RegimeType;
use crate::models::{
    AgentState, EmotionalTendency, PerformanceRecord, StrategyParameters, StyleProfile,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_DEPTH: usize = 30;
pub const DEFAULT_SEAL_THRESHOLD: u64 = 10;
pub const DEFAULT_LEARNING_WINDOW: usize = 5;
pub const DEFAULT_DRIFT_WINDOW: usize = 3;

/// Returns below this magnitude count as flat for stagnation detection.
const STAGNANT_RETURN_PCT: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of rounds kept in `history`
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Cumulative failures after which an indicator is sealed
    #[serde(default = "default_seal_threshold")]
    pub seal_threshold: u64,
    /// Rounds considered by the learning score
    #[serde(default = "default_learning_window")]
    pub learning_window: usize,
    /// Trace entries considered by style-drift detection
    #[serde(default = "default_drift_window")]
    pub drift_window: usize,
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

fn default_seal_threshold() -> u64 {
    DEFAULT_SEAL_THRESHOLD
}

fn default_learning_window() -> usize {
    DEFAULT_LEARNING_WINDOW
}

fn default_drift_window() -> usize {
    DEFAULT_DRIFT_WINDOW
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            seal_threshold: DEFAULT_SEAL_THRESHOLD,
            learning_window: DEFAULT_LEARNING_WINDOW,
            drift_window: DEFAULT_DRIFT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryFlag {
    Sealed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgingMark {
    Expired,
}

/// Scalar scores of the agent going into a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub init_bias_score: f64,
    pub temperature_level: f64,
    pub risk_tolerance: f64,
}

/// Agent-side context stored next to each round's performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundContext {
    pub generation: u64,
    pub symbol: String,
    pub params: StrategyParameters,
    pub style: StyleProfile,
    pub intent: Vec<String>,
    pub emotion: EmotionalTendency,
    #[serde(default)]
    pub score_snapshot: ScoreSnapshot,
    pub timestamp: DateTime<Utc>,
}

impl RoundContext {
    pub fn from_agent(agent: &AgentState, timestamp: DateTime<Utc>) -> Self {
        Self {
            generation: agent.generation,
            symbol: agent.symbol.clone(),
            params: agent.parameters,
            style: agent.style_profile,
            intent: agent.evolution_intent.clone(),
            emotion: agent.emotional_tendency,
            score_snapshot: ScoreSnapshot {
                init_bias_score: agent.init_bias_score,
                temperature_level: agent.temperature_level,
                risk_tolerance: agent.risk_tolerance,
            },
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Position of this entry among every round ever appended
    pub index: u64,
    #[serde(flatten)]
    pub performance: PerformanceRecord,
    #[serde(flatten)]
    pub context: RoundContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleChange {
    pub from: StyleProfile,
    pub to: StyleProfile,
}

/// What the policy decided at the end of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEvent {
    /// Generation after evolving
    pub generation: u64,
    pub regime: RegimeType,
    pub grade: Grade,
    pub frozen: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_change: Option<StyleChange>,
    pub emotion: EmotionalTendency,
    pub risk_tolerance: f64,
    pub bias_shift: f64,
    pub temperature_shift: f64,
    pub intent: Vec<String>,
}

/// One audit line per appended round. The fields up to `result` describe the
/// agent that played the round; `evolution` is what it turned into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub live_round: u64,
    pub generation: u64,
    pub timestamp: DateTime<Utc>,
    pub style: StyleProfile,
    pub intent: Vec<String>,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evolution: Option<EvolutionEvent>,
}

/// Persistent aggregate owned by [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub live_rounds: u64,
    #[serde(default)]
    pub total_appended: u64,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub fail_indicators_count: BTreeMap<String, u64>,
    #[serde(default)]
    pub memory_flags: BTreeMap<String, MemoryFlag>,
    #[serde(default)]
    pub learning_score: u32,
    #[serde(default)]
    pub style_drift_flag: bool,
    #[serde(default)]
    pub evolution_trace: Vec<TraceEntry>,
    #[serde(default)]
    pub aging_map: BTreeMap<u64, AgingMark>,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    config: MemoryConfig,
    snapshot: MemorySnapshot,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self::from_snapshot(config, MemorySnapshot::default())
    }

    pub fn from_snapshot(config: MemoryConfig, snapshot: MemorySnapshot) -> Self {
        Self { config, snapshot }
    }

    pub fn snapshot(&self) -> &MemorySnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> MemorySnapshot {
        self.snapshot
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Record one round. The record is validated before anything is touched,
    /// so a malformed record leaves the store unchanged.
    pub fn append(&mut self, record: &PerformanceRecord, context: RoundContext) -> Result<()> {
        record.validate()?;

        let snap = &mut self.snapshot;
        snap.live_rounds += 1;

        for indicator in &record.fail_indicators {
            let count = snap
                .fail_indicators_count
                .entry(indicator.clone())
                .or_insert(0);
            *count += 1;
            if *count >= self.config.seal_threshold {
                snap.memory_flags
                    .entry(indicator.clone())
                    .or_insert(MemoryFlag::Sealed);
            }
        }

        let trace = TraceEntry {
            live_round: snap.live_rounds,
            generation: context.generation,
            timestamp: context.timestamp,
            style: context.style,
            intent: context.intent.clone(),
            result: format!("{}% / {}% DD", record.return_pct, record.drawdown),
            evolution: None,
        };

        snap.history.push(HistoryEntry {
            index: snap.total_appended,
            performance: record.clone(),
            context,
        });
        snap.total_appended += 1;

        if snap.history.len() > self.config.depth {
            let overflow = snap.history.len() - self.config.depth;
            for expired in snap.history.drain(..overflow) {
                snap.aging_map.insert(expired.index, AgingMark::Expired);
            }
        }

        snap.learning_score = snap
            .history
            .iter()
            .rev()
            .take(self.config.learning_window)
            .filter(|entry| entry.performance.return_pct > 0.0)
            .count() as u32;

        snap.evolution_trace.push(trace);

        let recent_styles: BTreeSet<StyleProfile> = snap
            .evolution_trace
            .iter()
            .rev()
            .take(self.config.drift_window)
            .map(|entry| entry.style)
            .collect();
        snap.style_drift_flag = recent_styles.len() > 1;

        Ok(())
    }

    /// Attach the policy's decision to the latest trace entry. Each entry
    /// takes exactly one event.
    pub fn record_evolution(&mut self, event: EvolutionEvent) -> Result<()> {
        let Some(latest) = self.snapshot.evolution_trace.last_mut() else {
            return Err(EvolutionError::InsufficientData {
                required: 1,
                available: 0,
            });
        };
        if latest.evolution.is_some() {
            return Err(EvolutionError::malformed(
                "evolution_trace",
                format!("round {} already has an evolution event", latest.live_round),
            ));
        }
        latest.evolution = Some(event);
        Ok(())
    }

    /// Indicators whose cumulative failure count crossed the seal threshold.
    pub fn sealed_indicators(&self) -> BTreeSet<String> {
        self.snapshot
            .memory_flags
            .iter()
            .filter(|(_, flag)| **flag == MemoryFlag::Sealed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The most recent `n` history entries, oldest first.
    pub fn recent(&self, n: usize) -> &[HistoryEntry] {
        let history = &self.snapshot.history;
        &history[history.len().saturating_sub(n)..]
    }

    pub fn learning_score(&self) -> u32 {
        self.snapshot.learning_score
    }

    pub fn total_fail_count(&self) -> u64 {
        self.snapshot.fail_indicators_count.values().sum()
    }

    /// Flat returns over the last `window` rounds while the agent kept
    /// repeating the same intent.
    pub fn is_stagnant(&self, window: usize) -> bool {
        if window == 0 {
            return false;
        }
        let recent = self.recent(window);
        if recent.len() < window {
            return false;
        }
        let flat = recent
            .iter()
            .all(|entry| entry.performance.return_pct.abs() < STAGNANT_RETURN_PCT);
        let same_intent = recent
            .windows(2)
            .all(|pair| pair[0].context.intent == pair[1].context.intent);
        flat && same_intent
    }
}
