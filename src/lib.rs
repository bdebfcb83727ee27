//! KillCore Backend Library
//!
//! Self-evolving trading agent core. The `evolution` module holds the
//! per-round logic (memory, grading, regime, mutation policy); `runner`
//! wraps it with JSON persistence, round archives and the daemon loop.

pub mod agent;
pub mod config;
pub mod error;
pub mod evolution;
pub mod models;
pub mod runner;
pub mod simulator;

pub use config::KillcoreConfig;
pub use error::{EvolutionError, Result};
pub use models::{AgentState, MarketRegimeInput, PerformanceRecord, StyleProfile};
