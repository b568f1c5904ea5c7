//! CLI module for dbxbridge - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
