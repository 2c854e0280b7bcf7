//! Persistence layer for stablecoin transfer ingestion.
//!
//! Defines the record types, the [`Sink`] contract the ETL loops write
//! through, and three interchangeable backends: SQLite (with migrations),
//! PostgREST, and in-memory.

pub mod memory;
pub mod models;
pub mod pool;
pub mod rest;
pub mod sink;
pub mod sqlite;

pub use memory::MemorySink;
pub use pool::DbPool;
pub use rest::RestSink;
pub use sink::{Sink, SinkError, SinkResult, Table};
pub use sqlite::SqliteSink;
