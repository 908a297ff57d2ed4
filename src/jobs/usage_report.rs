//! The monthly usage report run.
//!
//! A run is strictly sequential:
//! 1. Read the usage rows for the reporting window (connection closed after)
//! 2. Open one directory session and aggregate, resolving each account once
//! 3. Filter, assemble and deliver one report per resolved account, pausing
//!    between messages to respect the relay's rate limit
//! 4. Send at most one administrative notice
//!
//! Only an unreadable database or an unreachable directory stops a run.
//! Everything that concerns a single account is collected into the
//! administrative summary instead.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    chart::ChartRenderer,
    config::{MailConfig, ReportsConfig},
    db::{DbError, UsageSource},
    directory::{Directory, DirectoryError},
    mail::{AdminNotice, FailureSummary, MailTransport, OutgoingMessage, ReportFailure, RunContext},
    models::ReportingWindow,
    services::{Aggregator, FilterDecision, RecipientFilter, ReportAssembler},
};

/// Failures that stop a run. An administrative notice has already been
/// attempted when one of these is returned.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Cannot compute a {months}-month reporting window ending {now}")]
    Window { now: DateTime<Utc>, months: u32 },

    #[error("Usage data source failed: {0}")]
    DataSource(#[from] DbError),

    #[error("Directory connection failed: {0}")]
    ResolverConnection(#[from] DirectoryError),
}

/// Results from a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Usage rows read.
    pub rows: usize,
    /// Accounts resolved.
    pub records: usize,
    /// Directory lookups performed.
    pub lookups: usize,
    /// Reports handed to the transport successfully.
    pub sent: usize,
    /// Reports assembled but only logged (dry run).
    pub previewed: usize,
    /// Accounts skipped because they opted out.
    pub excluded: usize,
    /// Accounts skipped by the allow-list.
    pub not_allowed: usize,
    /// Per-account problems, reported to the administrators.
    pub failures: FailureSummary,
    /// Whether the administrative summary was delivered.
    pub admin_notified: bool,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Enforces the minimum interval between consecutive messages.
struct Pacer {
    interval: Duration,
    sent_any: bool,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            sent_any: false,
        }
    }

    /// Wait, if needed, before handing the next message to the transport.
    async fn ready(&mut self) {
        if self.sent_any && !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        self.sent_any = true;
    }
}

pub struct UsageReportJob {
    usage: Arc<dyn UsageSource>,
    directory: Arc<dyn Directory>,
    transport: Arc<dyn MailTransport>,
    assembler: ReportAssembler,
    filter: RecipientFilter,
    mail: MailConfig,
    window_months: u32,
    context: RunContext,
}

impl UsageReportJob {
    pub fn new(
        config: &ReportsConfig,
        usage: Arc<dyn UsageSource>,
        directory: Arc<dyn Directory>,
        transport: Arc<dyn MailTransport>,
        renderer: Arc<dyn ChartRenderer>,
        filter: RecipientFilter,
    ) -> Self {
        let contact_address = config
            .report
            .contact_address
            .clone()
            .unwrap_or_else(|| config.mail.from_address.clone());

        Self {
            usage,
            directory,
            transport,
            assembler: ReportAssembler::new(config.report.clone(), contact_address, renderer),
            filter,
            mail: config.mail.clone(),
            window_months: config.database.window_months,
            context: RunContext::detect(),
        }
    }

    /// Override the host and run path reported in administrative notices.
    pub fn with_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    /// Run once for the reporting window ending with the month of `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        self.run_inner(now)
            .instrument(tracing::info_span!("usage_report_run", %run_id))
            .await
    }

    async fn run_inner(&self, now: DateTime<Utc>) -> Result<RunSummary, RunError> {
        let dry_run = self.mail.dry_run;
        let dry_run_msg = if dry_run { " (DRY RUN)" } else { "" };

        let window = ReportingWindow::ending_at(now, self.window_months).ok_or(RunError::Window {
            now,
            months: self.window_months,
        })?;

        tracing::info!(
            window = %window,
            source = self.usage.name(),
            directory = self.directory.name(),
            transport = self.transport.name(),
            allow_list = self.filter.has_allow_list(),
            exclusions = self.filter.exclusion_count(),
            dry_run,
            "Starting usage report run{}",
            dry_run_msg
        );

        let mut pacer = Pacer::new(if dry_run {
            Duration::ZERO
        } else {
            self.mail.send_interval()
        });

        // Phase 1: usage rows. The source releases its connection before returning.
        let rows = match self.usage.fetch_recent_usage(window).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, window = %window, "Failed to read usage data");
                self.notify_admin(
                    &AdminNotice::DataSourceFailure {
                        window,
                        detail: e.to_string(),
                    },
                    &mut pacer,
                )
                .await;
                return Err(e.into());
            }
        };

        // Phase 2: resolution. The session is closed by the aggregator.
        let session = match self.directory.open_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Failed to open directory session");
                self.notify_admin(
                    &AdminNotice::DirectoryFailure {
                        detail: e.to_string(),
                    },
                    &mut pacer,
                )
                .await;
                return Err(e.into());
            }
        };

        let mut summary = RunSummary {
            rows: rows.len(),
            ..Default::default()
        };

        let outcome = Aggregator::new(session).aggregate(rows).await;
        summary.records = outcome.records.len();
        summary.lookups = outcome.lookups;
        summary.failures.resolution = outcome.failures;
        summary.failures.anomalies = outcome.anomalies;

        // Phase 3: delivery, in identity key order.
        for record in outcome.records.values() {
            let key = record.identity_key.as_str();

            let decision = self.filter.check(record);
            match decision {
                FilterDecision::Accept => {}
                FilterDecision::Excluded => summary.excluded += 1,
                FilterDecision::NotAllowed => summary.not_allowed += 1,
            }
            if decision != FilterDecision::Accept {
                tracing::debug!(
                    identity_key = key,
                    decision = decision.as_str(),
                    "Skipping account"
                );
                continue;
            }

            let payload = match self.assembler.assemble(record) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(identity_key = key, error = %e, "Failed to assemble report");
                    summary.failures.render.push(ReportFailure {
                        identity_key: key.to_string(),
                        detail: e.to_string(),
                    });
                    continue;
                }
            };

            let message = OutgoingMessage::from_report(&self.mail.from_address, payload);

            if dry_run {
                tracing::info!(
                    identity_key = key,
                    recipient = %message.to,
                    subject = %message.subject,
                    body_bytes = message.html_body.len(),
                    "Report assembled (DRY RUN)"
                );
                summary.previewed += 1;
                continue;
            }

            pacer.ready().await;
            match self.transport.send(&message).await {
                Ok(()) => {
                    tracing::info!(identity_key = key, recipient = %message.to, "Report sent");
                    summary.sent += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        identity_key = key,
                        recipient = %message.to,
                        error = %e,
                        "Failed to deliver report"
                    );
                    summary.failures.delivery.push(ReportFailure {
                        identity_key: key.to_string(),
                        detail: e.to_string(),
                    });
                }
            }
        }

        // Phase 4: one summary for everything that went wrong per account.
        if summary.has_failures() {
            summary.admin_notified = self
                .notify_admin(&AdminNotice::RunSummary(summary.failures.clone()), &mut pacer)
                .await;
        }

        tracing::info!(
            rows = summary.rows,
            records = summary.records,
            lookups = summary.lookups,
            sent = summary.sent,
            previewed = summary.previewed,
            excluded = summary.excluded,
            not_allowed = summary.not_allowed,
            resolution_failures = summary.failures.resolution.len(),
            anomalies = summary.failures.anomalies.len(),
            render_failures = summary.failures.render.len(),
            delivery_failures = summary.failures.delivery.len(),
            "Usage report run complete{}",
            dry_run_msg
        );

        Ok(summary)
    }

    /// Send an administrative notice. Failures are logged and never change
    /// the outcome of the run. Returns whether the notice was delivered.
    async fn notify_admin(&self, notice: &AdminNotice, pacer: &mut Pacer) -> bool {
        let message = notice.to_message(
            &self.mail.from_address,
            self.mail.admin_address(),
            &self.context,
        );

        if self.mail.dry_run {
            tracing::info!(
                recipient = %message.to,
                subject = %message.subject,
                "Administrative notice not sent (DRY RUN)"
            );
            return false;
        }

        pacer.ready().await;
        match self.transport.send(&message).await {
            Ok(()) => {
                tracing::info!(recipient = %message.to, subject = %message.subject, "Administrative notice sent");
                true
            }
            Err(e) => {
                tracing::error!(recipient = %message.to, error = %e, "Failed to send administrative notice");
                false
            }
        }
    }
}
