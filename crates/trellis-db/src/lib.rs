//! Storage layer for Trellis
//!
//! `PgStore` backs production deployments; `MemoryStore` implements the same
//! repository traits for tests and single-process use.

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repositories;

pub use memory::MemoryStore;
pub use migrations::run_migrations;
pub use pool::{create_pool, DatabaseConfig};
pub use repositories::*;
