//! The processing pipeline.
//!
//! Files flow through these pieces, leaves first:
//!
//! - [`matcher`] picks the first configured value a field satisfies
//! - [`decoder`] turns a zstd stream into raw lines, one at a time
//! - [`sink`] appends matched lines to `<stem>_<value>.ndjson`
//! - [`worker`] runs decode, match and append for one file
//! - [`engine`] discovers files, admits workers and coordinates shutdown
//!
//! Lines of one file are handled in order by a single worker; files run in
//! parallel on a pool sized by the configured thread count.
pub mod decoder;
pub mod engine;
pub mod matcher;
pub mod sink;
pub mod worker;

pub use engine::Processor;
pub use matcher::ValueMatcher;
pub use worker::FileProcessor;
