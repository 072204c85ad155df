//! School analytics engine: aggregates student, grade, attendance and incident records into a
//! dashboard result, computes off the interactive path on a background worker, and reuses results
//! through an in-memory and a persistent cache.

pub mod cache;
pub mod cache_key;
pub mod calc;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod ipc;
pub mod model;
pub mod signature;
pub mod worker;
