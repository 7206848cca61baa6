//! Aggregation Transforms
//!
//! Many-to-one transforms that run after the per-sample rules:
//!
//! - [`libsize`]: Library-size table and its report metadata document
//! - [`report`]: Deduplicated input list for the combined report

pub mod libsize;
pub mod report;

pub use libsize::{aggregate_libsizes, run_libsize_rule, LibsizeTable};
pub use report::{dedup_paths, union_paths, MultiReport};
