//! Batch jobs.
//!
//! - **Usage report**: reads the latest usage snapshots, resolves every
//!   account through the directory and mails each user their report, then
//!   sends at most one administrative notice for the run.
//!
//! Jobs follow a consistent pattern:
//! 1. Configuration in `config/`
//! 2. A run function that performs a single pass
//! 3. A structured result type summarizing the pass
//!
//! # Example
//!
//! ```toml
//! [mail]
//! smtp_host = "relay.example.com"
//! from_address = "reports@example.com"
//! send_interval_ms = 2000
//! dry_run = true
//! ```

mod usage_report;

pub use usage_report::{RunError, RunSummary, UsageReportJob};
