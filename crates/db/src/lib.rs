//! `db` crate — SQLite storage behind hierarchical memory.
//!
//! One table per memory tier (`episodes`, `concepts`, `procedural_stats`),
//! created by the embedded migrations. Repository functions take a
//! [`DbPool`] and move plain row structs in and out; JSON decoding and
//! domain rules belong to the `memory` crate.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::DbPool;
