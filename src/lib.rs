//! Load-generation kernel: scheduler variants, bounded worker pool, per-request
//! observation capture, and the asynchronous Sink pipeline.
//!
//! Exposed as a library, not just a binary, so integration tests can drive
//! the kernel directly against a local HTTP stub rather than shelling out to
//! the compiled binary — the pattern the teacher uses in `tests/*.rs`.

pub mod client;
pub mod config;
pub mod connection_pool;
pub mod coordination;
pub mod errors;
pub mod observation;
pub mod percentiles;
pub mod pool;
pub mod report;
pub mod results;
pub mod scheduler;
pub mod sink;
pub mod timeout;
pub mod utils;
pub mod worker;
