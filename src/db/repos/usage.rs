use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{RawUsageRow, ReportingWindow},
};

/// Read access to per-account storage usage snapshots.
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Fetch every snapshot recorded inside `window`, ordered by account
    /// identifier, excluding the deleted-account sentinel.
    ///
    /// Implementations must not hold a connection open after returning.
    async fn fetch_recent_usage(&self, window: ReportingWindow) -> DbResult<Vec<RawUsageRow>>;

    /// Get the source name for logging.
    fn name(&self) -> &'static str;
}
