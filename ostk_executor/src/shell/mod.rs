//! # Shell Module
//!
//! Entry point and CLI logic for the `ostk_executor` binary.

pub mod cli;

pub use cli::{Cli, Command, ProgressPrinter, RunArgs, run};
