//! Ports layer - Trait definitions (interfaces).
//!
//! These traits define the contracts that adapters must implement.
//! Application services depend on these traits, not concrete implementations.

mod runner;

pub use runner::{CommandRunner, CommandSpec};
