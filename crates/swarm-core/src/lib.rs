//! Core types for the codex-swarm workflow engine.

pub mod agents;
pub mod branch;
pub mod config;
pub mod deps;
pub mod env;
pub mod events;
pub mod ids;
pub mod types;

pub use agents::*;
pub use branch::*;
pub use config::*;
pub use deps::*;
pub use env::*;
pub use events::*;
pub use ids::*;
pub use types::*;
