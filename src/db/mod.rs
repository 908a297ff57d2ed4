mod error;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;

#[cfg(all(test, feature = "database-postgres"))]
pub mod tests;

pub use error::{DbError, DbResult};
pub use repos::*;
