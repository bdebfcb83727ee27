//! Evolution Core
//!
//! Memory, grading, regime classification and the mutation policy that
//! together decide how an agent changes from one round to the next.
//!
//! Per round:
//! `PerformanceRecord` -> [`MemoryStore::append`] -> [`GradingEngine::grade`]
//! -> [`EvolutionPolicy::evolve`] -> next `AgentState`.
//!
//! Nothing in here logs, sleeps or touches the filesystem.

pub mod grading;
pub mod maturity;
pub mod memory;
pub mod policy;
pub mod regime;

pub use grading::{
    Grade, GradeResult, GradingConfig, GradingEngine, SelfEvaluation, TrendDirection,
    TrendReport,
};
pub use maturity::{MaturityCheck, MaturityReport, Recommendation};
pub use memory::{
    AgingMark, EvolutionEvent, HistoryEntry, MemoryConfig, MemoryFlag, MemorySnapshot,
    MemoryStore, RoundContext, ScoreSnapshot, StyleChange, TraceEntry,
};
pub use policy::{
    derive_bad_behavior, derive_emotion, EvolutionOutcome, EvolutionPolicy, PolicyConfig,
    FROZEN_INTENT, NO_ACTION_INTENT,
};
pub use regime::{RegimeClassifier, RegimeType};
