//! Agent creation and symbol choice.

pub mod generator;
pub mod symbol_selector;

pub use generator::{genetic_id, AgentGenerator, DEFAULT_CAPITAL, INDICATOR_POOL};
pub use symbol_selector::{
    SymbolMemory, SymbolScore, SymbolSelector, SymbolUsage, TickerStats, DEFAULT_SYMBOLS,
};
