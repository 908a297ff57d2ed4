//! Grouping raw usage rows into one record per resolved account.

use std::collections::{BTreeMap, HashSet};

use crate::{
    directory::DirectorySession,
    models::{
        AnomalyKind, IdentityRecord, RawUsageRow, ResolutionFailure, Sample, SampleAnomaly,
    },
    pricing::monthly_storage_cost,
};

/// Convert a raw row into a sample, deriving its month label and cost.
///
/// Negative quantities cannot be reported and are returned as an anomaly.
pub fn normalize(row: &RawUsageRow) -> Result<Sample, AnomalyKind> {
    if row.quantity.is_sign_negative() && !row.quantity.is_zero() {
        return Err(AnomalyKind::NegativeQuantity {
            quantity: row.quantity,
        });
    }

    Ok(Sample {
        quantity: row.quantity,
        recorded_at: row.recorded_at,
        period_label: row.recorded_at.format("%B").to_string(),
        cost: monthly_storage_cost(row.quantity),
    })
}

/// Result of aggregating one run's rows.
#[derive(Debug, Default)]
pub struct AggregationOutcome {
    /// Resolved accounts keyed by identity key, samples sorted oldest first.
    pub records: BTreeMap<String, IdentityRecord>,
    /// One entry per account that could not be resolved.
    pub failures: Vec<ResolutionFailure>,
    /// Rows that were dropped.
    pub anomalies: Vec<SampleAnomaly>,
    /// Number of directory lookups performed.
    pub lookups: usize,
}

/// Owns the directory session for the duration of the resolution phase.
pub struct Aggregator {
    session: Box<dyn DirectorySession>,
}

impl Aggregator {
    pub fn new(session: Box<dyn DirectorySession>) -> Self {
        Self { session }
    }

    /// Group `rows` by account, resolving each account at most once.
    ///
    /// Consumes the aggregator and closes the directory session before
    /// returning.
    pub async fn aggregate(mut self, rows: Vec<RawUsageRow>) -> AggregationOutcome {
        let mut outcome = AggregationOutcome::default();
        let mut failed: HashSet<String> = HashSet::new();

        for row in rows {
            if failed.contains(&row.identity_key) {
                continue;
            }

            let sample = match normalize(&row) {
                Ok(sample) => sample,
                Err(kind) => {
                    tracing::warn!(identity_key = %row.identity_key, anomaly = %kind, "Dropping usage row");
                    outcome.anomalies.push(SampleAnomaly {
                        identity_key: row.identity_key,
                        kind,
                    });
                    continue;
                }
            };

            if let Some(record) = outcome.records.get_mut(&row.identity_key) {
                let period = sample.period();
                match record.samples.iter_mut().find(|s| s.period() == period) {
                    Some(kept) => {
                        // Earliest reading wins, smaller quantity on a tie.
                        if (sample.recorded_at, sample.quantity)
                            < (kept.recorded_at, kept.quantity)
                        {
                            *kept = sample;
                        }
                        let kind = AnomalyKind::DuplicatePeriod { period };
                        tracing::warn!(identity_key = %row.identity_key, anomaly = %kind, "Dropping usage row");
                        outcome.anomalies.push(SampleAnomaly {
                            identity_key: row.identity_key,
                            kind,
                        });
                    }
                    None => record.samples.push(sample),
                }
                continue;
            }

            outcome.lookups += 1;
            match self.session.resolve(&row.identity_key).await.into_result() {
                Ok(attributes) => {
                    let key = row.identity_key;
                    outcome
                        .records
                        .insert(key.clone(), IdentityRecord::new(key, attributes, sample));
                }
                Err((category, detail)) => {
                    tracing::info!(
                        identity_key = %row.identity_key,
                        category = %category,
                        detail = %detail,
                        "Account could not be resolved"
                    );
                    failed.insert(row.identity_key.clone());
                    outcome.failures.push(ResolutionFailure {
                        identity_key: row.identity_key,
                        category,
                        detail,
                    });
                }
            }
        }

        for record in outcome.records.values_mut() {
            record.samples.sort_by_key(|s| s.recorded_at);
        }

        if let Err(e) = self.session.close().await {
            tracing::warn!(error = %e, "Failed to close directory session");
        }

        tracing::debug!(
            records = outcome.records.len(),
            failures = outcome.failures.len(),
            anomalies = outcome.anomalies.len(),
            lookups = outcome.lookups,
            "Aggregation complete"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::dec;

    use super::*;
    use crate::{
        directory::Resolution,
        models::{FailureCategory, ReportingPeriod},
        tests::doubles::{MapDirectory, row},
    };

    fn directory() -> MapDirectory {
        MapDirectory::new()
            .with_identity("u1", "Alex", "alex@example.com")
            .with_identity("u3", "Sam", "sam@example.com")
    }

    #[test]
    fn test_normalize_derives_label_and_cost() {
        let sample = normalize(&row("u1", dec!(5.0), 2024, 5)).unwrap();
        assert_eq!(sample.period_label, "May");
        assert_eq!(sample.cost, dec!(9.45));
        assert_eq!(sample.quantity, dec!(5.0));
    }

    #[test]
    fn test_normalize_rejects_negative_quantity() {
        let result = normalize(&row("u1", dec!(-0.5), 2024, 5));
        assert_eq!(
            result,
            Err(AnomalyKind::NegativeQuantity {
                quantity: dec!(-0.5)
            })
        );
        assert!(normalize(&row("u1", dec!(0), 2024, 5)).is_ok());
    }

    #[tokio::test]
    async fn test_groups_and_partitions() {
        let dir = directory();
        let rows = vec![
            row("u1", dec!(5.0), 2024, 5),
            row("u1", dec!(7.0), 2024, 6),
            row("u2", dec!(2.0), 2024, 6),
        ];

        let outcome = Aggregator::new(dir.session()).aggregate(rows).await;

        assert_eq!(outcome.records.len(), 1);
        let u1 = &outcome.records["u1"];
        assert_eq!(u1.display_name, "Alex");
        assert_eq!(u1.samples.len(), 2);
        assert_eq!(u1.samples[0].period_label, "May");
        assert_eq!(u1.samples[0].cost, dec!(9.45));
        assert_eq!(u1.samples[1].period_label, "June");
        assert_eq!(u1.samples[1].cost, dec!(14.85));

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].identity_key, "u2");
        assert_eq!(outcome.failures[0].category, FailureCategory::ResolverError);
        assert!(dir.closed());
    }

    #[tokio::test]
    async fn test_resolves_each_key_once() {
        let dir = directory();
        let rows = vec![
            row("u1", dec!(5), 2024, 5),
            row("u2", dec!(1), 2024, 5),
            row("u1", dec!(6), 2024, 6),
            row("u2", dec!(1), 2024, 6),
            row("u3", dec!(2), 2024, 6),
            row("u2", dec!(1), 2024, 4),
        ];

        let outcome = Aggregator::new(dir.session()).aggregate(rows).await;

        assert_eq!(dir.lookups(), vec!["u1", "u2", "u3"]);
        assert_eq!(outcome.lookups, 3);
        // A failed account contributes one failure no matter how many rows it has.
        assert_eq!(outcome.failures.len(), 1);
        assert!(!outcome.records.contains_key("u2"));
    }

    #[tokio::test]
    async fn test_order_independent_samples() {
        let forward = vec![
            row("u1", dec!(5), 2024, 5),
            row("u1", dec!(7), 2024, 6),
        ];
        let reversed: Vec<_> = forward.iter().rev().cloned().collect();

        let a = Aggregator::new(directory().session()).aggregate(forward).await;
        let b = Aggregator::new(directory().session()).aggregate(reversed).await;

        assert_eq!(a.records["u1"].samples, b.records["u1"].samples);
        assert_eq!(a.records["u1"].latest().unwrap().quantity, dec!(7));
    }

    #[tokio::test]
    async fn test_single_sample_is_valid() {
        let outcome = Aggregator::new(directory().session())
            .aggregate(vec![row("u3", dec!(2.5), 2024, 6)])
            .await;

        let u3 = &outcome.records["u3"];
        assert_eq!(u3.samples.len(), 1);
        assert!(u3.previous().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_period_tie_keeps_smaller_quantity() {
        let outcome = Aggregator::new(directory().session())
            .aggregate(vec![
                row("u1", dec!(9), 2024, 6),
                row("u1", dec!(5), 2024, 6),
            ])
            .await;

        let u1 = &outcome.records["u1"];
        assert_eq!(u1.samples.len(), 1);
        assert_eq!(u1.samples[0].quantity, dec!(5));
        assert_eq!(
            outcome.anomalies,
            vec![SampleAnomaly {
                identity_key: "u1".into(),
                kind: AnomalyKind::DuplicatePeriod {
                    period: ReportingPeriod {
                        year: 2024,
                        month: 6
                    }
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_duplicate_period_independent_of_row_order() {
        let june = |day| Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap();
        let early = RawUsageRow::new("u1", dec!(5), june(1));
        let late = RawUsageRow::new("u1", dec!(9), june(15));

        let forward = Aggregator::new(directory().session())
            .aggregate(vec![early.clone(), late.clone()])
            .await;
        let reversed = Aggregator::new(directory().session())
            .aggregate(vec![late, early])
            .await;

        assert_eq!(forward.records["u1"].samples, reversed.records["u1"].samples);
        assert_eq!(forward.records["u1"].samples[0].quantity, dec!(5));
        assert_eq!(forward.anomalies, reversed.anomalies);
        assert_eq!(reversed.anomalies.len(), 1);
    }

    #[tokio::test]
    async fn test_rows_after_failed_resolution_are_silently_dropped() {
        let dir = directory();
        let outcome = Aggregator::new(dir.session())
            .aggregate(vec![
                row("u2", dec!(2), 2024, 5),
                row("u2", dec!(-1), 2024, 6),
                row("u2", dec!(3), 2024, 6),
            ])
            .await;

        assert_eq!(dir.lookups(), vec!["u2"]);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.anomalies.is_empty());
    }

    #[tokio::test]
    async fn test_negative_row_does_not_trigger_lookup() {
        let dir = directory();
        let outcome = Aggregator::new(dir.session())
            .aggregate(vec![row("u1", dec!(-3), 2024, 6)])
            .await;

        assert!(dir.lookups().is_empty());
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.anomalies.len(), 1);
    }

    #[tokio::test]
    async fn test_attribute_missing_category() {
        let dir = MapDirectory::new().with_resolution(
            "u4",
            Resolution::AttributeMissing {
                attribute: "mail".into(),
            },
        );
        let outcome = Aggregator::new(dir.session())
            .aggregate(vec![row("u4", dec!(3), 2024, 6)])
            .await;

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.failures[0].category, FailureCategory::AttributeMissing);
        assert_eq!(outcome.failures[0].detail, "no value for 'mail'");
    }

    #[tokio::test]
    async fn test_records_in_key_order() {
        let outcome = Aggregator::new(directory().session())
            .aggregate(vec![
                row("u3", dec!(2), 2024, 6),
                row("u1", dec!(2), 2024, 6),
            ])
            .await;

        let keys: Vec<_> = outcome.records.keys().cloned().collect();
        assert_eq!(keys, vec!["u1", "u3"]);
    }
}
