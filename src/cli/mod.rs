//! Command-line interface for staff-runner.
//!
//! Provides the long-running scheduler, a backfill over past dates, and two
//! inspection commands for locating and judging input files.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
