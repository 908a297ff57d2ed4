//! PostgreSQL integration tests for the usage source
//!
//! These use testcontainers and are ignored by default:
//!
//! ```bash
//! cargo test -- --ignored          # Run PostgreSQL integration tests (requires Docker)
//! cargo test -- --include-ignored  # Run all tests
//! ```
