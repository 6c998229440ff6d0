//! Training session aggregation: load the session export, filter by advisor,
//! evaluator and training date, and summarize the result.

pub mod aggregate;
pub mod cache;
pub mod error;
pub mod ingest;
pub mod models;
pub mod report;
