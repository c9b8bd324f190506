//! depex - dependency configuration analysis over SMT
//!
//! This crate turns a requirement file's dependency graph into an SMT-LIB2
//! formula whose models are the installable configurations, then answers
//! questions about them: validity, lowest or highest vulnerability impact,
//! completion of partial configurations, and counting.

pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod operations;
pub mod sanitize;
pub mod server;
pub mod smt;
pub mod solver;
pub mod translate;
pub mod versions;
