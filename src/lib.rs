//! Feed aggregation core: picks the least recently fetched RSS feed on a
//! fixed interval, downloads and parses it, and stores new items as posts.
//!
//! Duplicate items are absorbed by the store's unique-link constraint, bad
//! dates fall back to the ingestion time, and a failing feed never stops the
//! loop.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalizer;
pub mod scheduler;
pub mod store;
pub mod timestamp;
pub mod writer;

pub use error::{CycleError, FetchError, ParseError, SetupError, StoreError};
pub use fetcher::{Deadline, Fetch, HttpFetcher};
pub use scheduler::{parse_interval, run_ingestion_loop, Scheduler, TickOutcome};
pub use store::{FileStore, Store};
