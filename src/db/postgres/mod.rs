mod usage;

pub use usage::PostgresUsageSource;
