use std::fmt;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single usage snapshot as read from the usage table.
///
/// Quantities are in GB. One row per account per reporting period is
/// expected, but the source is not trusted to guarantee it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUsageRow {
    pub identity_key: String,
    pub quantity: Decimal,
    pub recorded_at: DateTime<Utc>,
}

impl RawUsageRow {
    pub fn new(
        identity_key: impl Into<String>,
        quantity: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity_key: identity_key.into(),
            quantity,
            recorded_at,
        }
    }
}

/// Calendar month a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub year: i32,
    pub month: u32,
}

impl ReportingPeriod {
    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A normalized usage snapshot with its derived cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Storage used, in GB. Never negative.
    pub quantity: Decimal,
    pub recorded_at: DateTime<Utc>,
    /// Full English month name of `recorded_at`, e.g. "May".
    pub period_label: String,
    /// Monthly cost in dollars, derived from `quantity` alone.
    pub cost: Decimal,
}

impl Sample {
    pub fn period(&self) -> ReportingPeriod {
        ReportingPeriod::of(self.recorded_at)
    }
}

/// Contact details returned by the directory for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAttributes {
    pub display_name: String,
    pub contact_address: String,
}

/// Everything needed to report on one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub identity_key: String,
    pub display_name: String,
    pub contact_address: String,
    /// Sorted ascending by `recorded_at` once aggregation finishes.
    pub samples: Vec<Sample>,
}

impl IdentityRecord {
    pub fn new(identity_key: String, attributes: IdentityAttributes, first: Sample) -> Self {
        Self {
            identity_key,
            display_name: attributes.display_name,
            contact_address: attributes.contact_address,
            samples: vec![first],
        }
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Sample immediately before the most recent one, if the account has one.
    pub fn previous(&self) -> Option<&Sample> {
        self.samples.len().checked_sub(2).map(|i| &self.samples[i])
    }
}

/// Why an account could not be resolved in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The account was found but has no contact address or display name.
    AttributeMissing,
    /// The lookup itself failed (not found, network, protocol, timeout).
    ResolverError,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttributeMissing => "attribute_missing",
            Self::ResolverError => "resolver_error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::AttributeMissing => "missing directory attributes",
            Self::ResolverError => "directory lookup failed",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account excluded from the run because it could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionFailure {
    pub identity_key: String,
    pub category: FailureCategory,
    pub detail: String,
}

/// A usage row that was dropped because it cannot be reported faithfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleAnomaly {
    pub identity_key: String,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// The row reported a negative quantity.
    NegativeQuantity { quantity: Decimal },
    /// A second row for a period the account already has a sample for.
    DuplicatePeriod { period: ReportingPeriod },
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeQuantity { quantity } => write!(f, "negative quantity {}", quantity),
            Self::DuplicatePeriod { period } => write!(f, "duplicate row for {}", period),
        }
    }
}

/// The rendered report for one account, ready to hand to the mail transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPayload {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    /// PNG bytes, referenced from `html_body` by content id.
    pub chart_png: Vec<u8>,
}

/// The calendar months a run reports on: `[start, end)`, both month starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportingWindow {
    /// The `months` calendar months ending with (and including) the month of `now`.
    ///
    /// Returns `None` when `months` is zero or the dates overflow.
    pub fn ending_at(now: DateTime<Utc>, months: u32) -> Option<Self> {
        if months == 0 {
            return None;
        }
        let current = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)?;
        let start = current.checked_sub_months(Months::new(months - 1))?;
        let end = current.checked_add_months(Months::new(1))?;
        Some(Self { start, end })
    }

    pub fn start_at(&self) -> NaiveDateTime {
        self.start.and_time(chrono::NaiveTime::MIN)
    }

    pub fn end_at(&self) -> NaiveDateTime {
        self.end.and_time(chrono::NaiveTime::MIN)
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let t = timestamp.naive_utc();
        t >= self.start_at() && t < self.end_at()
    }
}

impl fmt::Display for ReportingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
