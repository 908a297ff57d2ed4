use std::fmt::Write;

use super::{OutgoingMessage, escape_html};
use crate::models::{FailureCategory, ReportingWindow, ResolutionFailure, SampleAnomaly};

/// Where the run happened, included in every administrative notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub host: String,
    pub run_path: String,
}

impl RunContext {
    pub fn detect() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let run_path = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self { host, run_path }
    }
}

/// A report that could not be rendered or delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFailure {
    pub identity_key: String,
    pub detail: String,
}

/// Everything that went wrong for individual accounts during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureSummary {
    pub resolution: Vec<ResolutionFailure>,
    pub anomalies: Vec<SampleAnomaly>,
    pub render: Vec<ReportFailure>,
    pub delivery: Vec<ReportFailure>,
}

impl FailureSummary {
    pub fn is_empty(&self) -> bool {
        self.resolution.is_empty()
            && self.anomalies.is_empty()
            && self.render.is_empty()
            && self.delivery.is_empty()
    }

    /// Failed identity keys for one resolution category, in the order they failed.
    pub fn keys_for(&self, category: FailureCategory) -> Vec<&str> {
        self.resolution
            .iter()
            .filter(|f| f.category == category)
            .map(|f| f.identity_key.as_str())
            .collect()
    }
}

/// A message for the administrators. At most one is sent per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminNotice {
    /// The usage database could not be read; nothing was sent.
    DataSourceFailure {
        window: ReportingWindow,
        detail: String,
    },
    /// The directory could not be connected to or bound; nothing was sent.
    DirectoryFailure { detail: String },
    /// The run completed but some accounts were skipped.
    RunSummary(FailureSummary),
}

impl AdminNotice {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::DataSourceFailure { .. } | Self::DirectoryFailure { .. } => {
                "Usage report run failed"
            }
            Self::RunSummary(_) => "Usage report run completed with failures",
        }
    }

    pub fn html_body(&self, context: &RunContext) -> String {
        let mut body = String::from("<html><head></head><body><p>");
        body.push_str("The scheduled usage report run has sent an automated report email.");
        let _ = write!(
            body,
            "<br />Server: {}<br />Run path: {}<br /><br />",
            escape_html(&context.host),
            escape_html(&context.run_path)
        );

        match self {
            Self::DataSourceFailure { window, detail } => {
                let _ = write!(
                    body,
                    "The run failed to connect to or read from the usage database for {}.\
                     <br />Message detail: {}",
                    window,
                    escape_html(detail)
                );
            }
            Self::DirectoryFailure { detail } => {
                let _ = write!(
                    body,
                    "The run failed to connect or log in to the directory.\
                     <br />Message detail: {}",
                    escape_html(detail)
                );
            }
            Self::RunSummary(summary) => write_summary(&mut body, summary),
        }

        body.push_str("</p></body></html>");
        body
    }

    pub fn to_message(&self, from: &str, to: &str, context: &RunContext) -> OutgoingMessage {
        OutgoingMessage {
            from: from.to_string(),
            to: to.to_string(),
            subject: self.subject().to_string(),
            html_body: self.html_body(context),
            inline_image: None,
        }
    }
}

fn write_summary(body: &mut String, summary: &FailureSummary) {
    if !summary.resolution.is_empty() {
        body.push_str("Some accounts could not be resolved in the directory.");
        for category in [FailureCategory::AttributeMissing, FailureCategory::ResolverError] {
            let keys = summary.keys_for(category);
            if keys.is_empty() {
                continue;
            }
            let _ = write!(
                body,
                "<br /><br />Accounts skipped due to {} ({}): {}",
                category.description(),
                category,
                escape_html(&keys.join(","))
            );
        }
        body.push_str("<br /><br />");
    }

    if !summary.anomalies.is_empty() {
        body.push_str("Usage rows dropped:");
        for anomaly in &summary.anomalies {
            let _ = write!(
                body,
                "<br />{}: {}",
                escape_html(&anomaly.identity_key),
                escape_html(&anomaly.kind.to_string())
            );
        }
        body.push_str("<br /><br />");
    }

    for (heading, failures) in [
        ("Reports that could not be rendered:", &summary.render),
        ("Reports that could not be delivered:", &summary.delivery),
    ] {
        if failures.is_empty() {
            continue;
        }
        body.push_str(heading);
        for failure in failures {
            let _ = write!(
                body,
                "<br />{}: {}",
                escape_html(&failure.identity_key),
                escape_html(&failure.detail)
            );
        }
        body.push_str("<br /><br />");
    }
}
