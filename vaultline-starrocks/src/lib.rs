//! # Vaultline StarRocks
//!
//! [`Engine`](vaultline_core::Engine) implementation for StarRocks. Snapshot
//! commands are sent as plain statements over the MySQL protocol; job state
//! comes from `SHOW BACKUP` / `SHOW RESTORE` and partition metadata from
//! `information_schema`.
//!
//! A StarRocks snapshot belongs to exactly one database, so every
//! descriptor handed to this engine must stay within one database.

pub mod engine;
pub mod statements;

pub use engine::{StarRocksConfig, StarRocksEngine};
