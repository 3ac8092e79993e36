//! CLI subcommands

pub mod fleet;
pub mod monitors;
