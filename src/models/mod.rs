mod usage;

pub use usage::*;
