//! Background Tasks Module
//!
//! Periodic work driven from outside the engine.
//!
//! # Tasks
//! - Auto-prune: removes expired entries from an engine and its namespaces

mod auto_prune;

pub use auto_prune::spawn_auto_prune_task;
