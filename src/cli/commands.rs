//! Implementations of the `crosstest` subcommands.

pub mod drive;
pub mod init;
pub mod run;
