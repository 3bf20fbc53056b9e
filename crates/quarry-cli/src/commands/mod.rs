//! Subcommand implementations.

pub mod clear;
pub mod index;
pub mod search;
pub mod shell;
pub mod status;
pub mod watch;
