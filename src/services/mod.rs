//! Core report pipeline: aggregation, report assembly and recipient filtering.

mod aggregation;
mod recipients;
mod report;

pub use aggregation::{AggregationOutcome, Aggregator, normalize};
pub use recipients::{ExclusionListError, FilterDecision, RecipientFilter, load_exclusions};
pub use report::ReportAssembler;
