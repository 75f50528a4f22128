//! GeistFabrik - session-scoped semantic index over an interlinked note vault
//!
//! Maintains a versioned, cached vector representation of every note for an
//! analysis session, serves graph and semantic queries against it with
//! session-scoped caching, and filters generated suggestions for novelty,
//! diversity and quality using the same embedding machinery.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod filtering;
pub mod notes;
pub mod query;
pub mod session;
pub mod storage;

pub use error::{GeistError, Result};
