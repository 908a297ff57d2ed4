//! End-to-end runs of the usage report job against in-memory collaborators.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::dec;

use super::doubles::{MapDirectory, RecordingTransport, StaticUsageSource, StubRenderer, row};
use crate::{
    config::ReportsConfig,
    jobs::{RunError, UsageReportJob},
    mail::RunContext,
    models::FailureCategory,
    services::RecipientFilter,
};

const ADMIN: &str = "admins@example.com";

fn config() -> ReportsConfig {
    ReportsConfig::from_str(
        r#"
[database]
url = "postgres://u:p@localhost/metabase"

[directory]
url = "ldap://localhost:389"
bind_dn = "cn=svc"
bind_password = "secret"
base_dn = "dc=example,dc=com"

[mail]
smtp_host = "localhost"
from_address = "reports@example.com"
admin_address = "admins@example.com"
send_interval_ms = 2000
"#,
    )
    .unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 17, 9, 0, 0).unwrap()
}

struct Harness {
    source: Arc<StaticUsageSource>,
    directory: Arc<MapDirectory>,
    transport: Arc<RecordingTransport>,
    renderer: Arc<StubRenderer>,
    config: ReportsConfig,
    filter: RecipientFilter,
}

impl Harness {
    fn new(source: StaticUsageSource, directory: MapDirectory) -> Self {
        Self {
            source: Arc::new(source),
            directory: Arc::new(directory),
            transport: Arc::new(RecordingTransport::new()),
            renderer: Arc::new(StubRenderer::new()),
            config: config(),
            filter: RecipientFilter::default(),
        }
    }

    fn job(&self) -> UsageReportJob {
        UsageReportJob::new(
            &self.config,
            self.source.clone(),
            self.directory.clone(),
            self.transport.clone(),
            self.renderer.clone(),
            self.filter.clone(),
        )
        .with_context(RunContext {
            host: "reports-01".into(),
            run_path: "/opt/usage-reports/bin/usage-reports".into(),
        })
    }

    fn admin_notices(&self) -> Vec<crate::mail::OutgoingMessage> {
        self.transport
            .attempts()
            .into_iter()
            .filter(|m| m.to == ADMIN)
            .collect()
    }

    fn report_recipients(&self) -> Vec<String> {
        self.transport
            .recipients()
            .into_iter()
            .filter(|to| to != ADMIN)
            .collect()
    }
}

#[tokio::test(start_paused = true)]
async fn test_resolved_and_failed_identities() {
    let h = Harness::new(
        StaticUsageSource::new(vec![
            row("U1", dec!(5.0), 2024, 5),
            row("U1", dec!(7.0), 2024, 6),
            row("U2", dec!(2.0), 2024, 6),
        ]),
        MapDirectory::new().with_identity("U1", "Alex", "alex@example.com"),
    );

    let summary = h.job().run(now()).await.unwrap();

    assert_eq!(summary.rows, 3);
    assert_eq!(summary.records, 1);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failures.resolution.len(), 1);
    assert_eq!(summary.failures.resolution[0].identity_key, "U2");
    assert_eq!(
        summary.failures.resolution[0].category,
        FailureCategory::ResolverError
    );
    assert!(summary.admin_notified);

    assert_eq!(h.report_recipients(), vec!["alex@example.com"]);
    let attempts = h.transport.attempts();
    let report = &attempts[0];
    assert_eq!(report.subject, "Your H: Drive Usage Report for June");
    assert!(report.html_body.contains("costing $14.85 for the month of June."));
    assert!(report.html_body.contains("In May, you used 5.00 GB at a cost of $9.45."));
    assert_eq!(report.inline_image.as_ref().unwrap().content_id, "usage-chart");

    let notices = h.admin_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].html_body.contains("(resolver_error): U2"));
    assert!(notices[0].html_body.contains("Server: reports-01"));

    assert_eq!(h.directory.lookups(), vec!["U1", "U2"]);
    assert!(h.directory.closed());
}

#[tokio::test(start_paused = true)]
async fn test_allow_list_limits_deliveries() {
    let mut h = Harness::new(
        StaticUsageSource::new(vec![
            row("u1", dec!(3), 2024, 6),
            row("u2", dec!(4), 2024, 6),
        ]),
        MapDirectory::new()
            .with_identity("u1", "A", "a@x.com")
            .with_identity("u2", "B", "b@x.com"),
    );
    h.filter = RecipientFilter::new(Some("a@x.com"), vec![]);

    let summary = h.job().run(now()).await.unwrap();

    assert_eq!(h.transport.recipients(), vec!["a@x.com"]);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.not_allowed, 1);
    assert!(!summary.has_failures());
    assert!(h.admin_notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_data_source_failure_stops_run() {
    let h = Harness::new(
        StaticUsageSource::failing("connection refused"),
        MapDirectory::new().with_identity("u1", "A", "a@x.com"),
    );

    let result = h.job().run(now()).await;

    assert!(matches!(result, Err(RunError::DataSource(_))));
    assert_eq!(h.source.calls(), 1);
    assert_eq!(h.directory.sessions_opened(), 0);
    assert!(h.directory.lookups().is_empty());
    assert!(h.report_recipients().is_empty());

    let notices = h.admin_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].subject, "Usage report run failed");
    assert!(notices[0].html_body.contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_directory_failure_stops_run() {
    let h = Harness::new(
        StaticUsageSource::new(vec![row("u1", dec!(3), 2024, 6)]),
        MapDirectory::failing_to_open(),
    );

    let result = h.job().run(now()).await;

    assert!(matches!(result, Err(RunError::ResolverConnection(_))));
    assert!(h.report_recipients().is_empty());
    let notices = h.admin_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].html_body.contains("log in to the directory"));
}

#[tokio::test(start_paused = true)]
async fn test_queries_two_month_window() {
    let h = Harness::new(StaticUsageSource::new(vec![]), MapDirectory::new());

    let summary = h.job().run(now()).await.unwrap();

    let windows = h.source.windows();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].start, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    assert_eq!(windows[0].end, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
    assert_eq!(summary.sent, 0);
    assert!(h.transport.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pauses_between_sends() {
    let h = Harness::new(
        StaticUsageSource::new(vec![
            row("u1", dec!(3), 2024, 6),
            row("u2", dec!(4), 2024, 6),
            row("u3", dec!(5), 2024, 6),
        ]),
        MapDirectory::new()
            .with_identity("u1", "A", "a@x.com")
            .with_identity("u2", "B", "b@x.com")
            .with_identity("u3", "C", "c@x.com"),
    );

    h.job().run(now()).await.unwrap();

    let times = h.transport.attempt_times();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(2000));
    }
}

#[tokio::test(start_paused = true)]
async fn test_delivery_failure_does_not_stop_others() {
    let mut h = Harness::new(
        StaticUsageSource::new(vec![
            row("u1", dec!(3), 2024, 6),
            row("u2", dec!(4), 2024, 6),
        ]),
        MapDirectory::new()
            .with_identity("u1", "A", "a@x.com")
            .with_identity("u2", "B", "b@x.com"),
    );
    h.transport = Arc::new(RecordingTransport::new().failing_for("a@x.com"));

    let summary = h.job().run(now()).await.unwrap();

    assert_eq!(h.report_recipients(), vec!["a@x.com", "b@x.com"]);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failures.delivery.len(), 1);
    assert_eq!(summary.failures.delivery[0].identity_key, "u1");

    let notices = h.admin_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].html_body.contains("could not be delivered"));
}

#[tokio::test(start_paused = true)]
async fn test_render_failure_skips_identity() {
    let mut h = Harness::new(
        StaticUsageSource::new(vec![
            row("u1", dec!(3), 2024, 6),
            row("u2", dec!(4), 2024, 6),
        ]),
        MapDirectory::new()
            .with_identity("u1", "Alex", "a@x.com")
            .with_identity("u2", "Sam", "b@x.com"),
    );
    h.renderer = Arc::new(StubRenderer::failing_for("Alex"));

    let summary = h.job().run(now()).await.unwrap();

    assert_eq!(h.report_recipients(), vec!["b@x.com"]);
    assert_eq!(summary.failures.render.len(), 1);
    assert_eq!(h.admin_notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exclusions_skip_identity() {
    let mut h = Harness::new(
        StaticUsageSource::new(vec![
            row("u1", dec!(3), 2024, 6),
            row("u2", dec!(4), 2024, 6),
        ]),
        MapDirectory::new()
            .with_identity("u1", "A", "a@x.com")
            .with_identity("u2", "B", "b@x.com"),
    );
    h.filter = RecipientFilter::new(None, vec!["u2".to_string()]);

    let summary = h.job().run(now()).await.unwrap();

    assert_eq!(h.transport.recipients(), vec!["a@x.com"]);
    assert_eq!(summary.excluded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_sends_nothing() {
    let mut h = Harness::new(
        StaticUsageSource::new(vec![
            row("u1", dec!(3), 2024, 6),
            row("u2", dec!(4), 2024, 6),
            row("u3", dec!(-1), 2024, 6),
        ]),
        MapDirectory::new()
            .with_identity("u1", "A", "a@x.com")
            .with_identity("u2", "B", "b@x.com"),
    );
    h.config.mail.dry_run = true;
    let start = tokio::time::Instant::now();

    let summary = h.job().run(now()).await.unwrap();

    assert!(h.transport.attempts().is_empty());
    assert_eq!(summary.previewed, 2);
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.failures.anomalies.len(), 1);
    assert!(!summary.admin_notified);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_rerun_produces_same_reports() {
    let rows = vec![
        row("u1", dec!(5), 2024, 5),
        row("u1", dec!(7), 2024, 6),
    ];
    let first = Harness::new(
        StaticUsageSource::new(rows.clone()),
        MapDirectory::new().with_identity("u1", "A", "a@x.com"),
    );
    let second = Harness::new(
        StaticUsageSource::new(rows),
        MapDirectory::new().with_identity("u1", "A", "a@x.com"),
    );

    first.job().run(now()).await.unwrap();
    second.job().run(now()).await.unwrap();

    assert_eq!(first.transport.attempts(), second.transport.attempts());
}
