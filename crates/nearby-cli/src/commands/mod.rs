//! Subcommand implementations.

pub mod serve;
pub mod status;
pub mod sync;
