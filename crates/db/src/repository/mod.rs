//! Repository functions, one per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! Plain SQL over row structs.

pub mod episodes;
pub mod concepts;
pub mod procedural;
