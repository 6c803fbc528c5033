#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod types;
pub mod rules;
pub mod state;
pub mod hash;

pub mod engine {
    pub mod apply;
    pub mod score;
}

pub mod store;
pub mod solver;
pub mod config;
pub mod governor;

// Re-exports: stable minimal API surface for external callers
pub use crate::config::SolveConfig;
pub use crate::engine::apply::{apply_move, RulesError};
pub use crate::engine::score::payoff;
pub use crate::governor::{MemoryMonitor, Pressure};
pub use crate::hash::{ZobristTable, DEFAULT_ZOBRIST_SEED};
pub use crate::rules::Variant;
pub use crate::solver::{solve, SolveError, SolveReport};
pub use crate::state::{is_terminal, legal_moves, unpack, GameState};
pub use crate::store::{
    Compression, MemoryStore, PositionRecord, PositionStore, SnapshotHeader, SnapshotStore,
    StoreError,
};
pub use crate::types::Player;
