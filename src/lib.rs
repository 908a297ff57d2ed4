//! Monthly storage usage reports.
//!
//! Reads the two most recent usage snapshots per account from the usage
//! database, resolves each account's contact details through the directory,
//! and mails every user a personalised report with an embedded bar chart.
//! Failures that concern a single account are collected and mailed to an
//! administrator once per run; only an unreachable database or directory
//! stops the run.

pub mod chart;
pub mod config;
pub mod db;
pub mod directory;
pub mod jobs;
pub mod mail;
pub mod models;
pub mod observability;
pub mod pricing;
pub mod services;

#[cfg(test)]
mod tests;
