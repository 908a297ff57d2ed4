//! Storage billing.
//!
//! Home drive storage is billed per GB per month, after a free allowance.
//! Amounts are kept as [`Decimal`] so the rounded cents in a report are exact.

use rust_decimal::{Decimal, RoundingStrategy, dec};

/// Price of one GB of storage for one month, in dollars.
pub const PRICE_PER_GB_MONTH: Decimal = dec!(2.70);

/// Storage that is not billed, in GB.
pub const FREE_ALLOWANCE_GB: Decimal = dec!(1.5);

/// Monthly cost in dollars for `quantity_gb` of storage.
///
/// `max(0, round((quantity - 1.5) * 2.7, 2))`: usage inside the free allowance
/// costs nothing, and the result is never negative.
pub fn monthly_storage_cost(quantity_gb: Decimal) -> Decimal {
    let billable = quantity_gb - FREE_ALLOWANCE_GB;
    if billable <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    (billable * PRICE_PER_GB_MONTH)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format a dollar amount with exactly two decimal places, e.g. `$9.45`.
pub fn format_dollars(amount: Decimal) -> String {
    format!("${:.2}", amount)
}
