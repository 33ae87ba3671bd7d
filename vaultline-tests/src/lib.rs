//! Shared test utilities for vaultline crates
//!
//! This crate provides:
//! - **Fixtures**: ledger rows with sensible defaults for inventory, backups and partitions
//! - **Mocks**: a scripted [`Engine`](vaultline_core::Engine) that records every call
//! - **Assertions**: checks against ledger state used across integration tests
//!
//! # Example
//!
//! ```ignore
//! use vaultline_tests::{fixtures, mocks::ScriptedEngine};
//!
//! #[tokio::test]
//! async fn test_full_backup() {
//!     let engine = ScriptedEngine::new().with_table("sales_db", "orders", &["p1", "p2"]);
//!     let ledger = InMemoryLedger::new();
//!     ledger.upsert_inventory(&[fixtures::inventory::table("sales", "sales_db", "orders")]).await?;
//!     // Run the backup and inspect engine.backups()
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used items
pub use fixtures::{backup, inventory, partition};
pub use mocks::ScriptedEngine;
