//! CLI module for arr-router - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
