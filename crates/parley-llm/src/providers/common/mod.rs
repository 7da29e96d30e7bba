//! Shared adapter plumbing.

pub mod ndjson;
pub mod sse;
