//! trimem-core - Core library for trimem
//!
//! This crate provides the pieces shared by the engine SDK and the CLI:
//!
//! - **types**: Facts, Episodes, Entities, Triples and graph projections
//! - **store**: narrow async contracts for the Fact, Episode and Graph stores
//! - **gateway**: language model gateway contract, retry and chunking
//! - **vector**: cosine similarity and embedding blob encoding
//! - **db**: SQLite reference adapters for the three stores (feature `db`)
//!
//! The HTTP gateway (`gateway::http`) is behind the `client` feature.

pub mod error;
pub mod gateway;
pub mod store;
pub mod types;
pub mod vector;

#[cfg(feature = "db")]
pub mod db;

// Re-export commonly used types
pub use error::{Error, Result};
pub use gateway::{LanguageModelGateway, ResilientGateway, RetryPolicy};
pub use store::{EpisodeCount, EpisodeStore, FactStore, GraphCounts, GraphStore, Removal};

#[cfg(feature = "db")]
pub use db::Database;
