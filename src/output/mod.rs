//! Output module for reporting
//!
//! This module produces the per-poll summary logged by the coordinator and
//! the ledger statistics printed by `--stats`.

mod stats;

pub use stats::{load_statistics, print_statistics, LedgerStatistics, PollStatistics};
