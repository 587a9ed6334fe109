#![forbid(unsafe_code)]

//! Collects metadata for every upload of a YouTube channel.
//!
//! A fetch resolves the channel's uploads playlist, pages through it to
//! create one record per video from the `snippet` part, then fills in the
//! `statistics`, `status` and `contentDetails` fields the caller asked for
//! with batched `videos` lookups. Records keep the playlist order and are
//! exported as a single pretty-printed JSON document.

pub mod aggregate;
pub mod api;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod paginate;
pub mod progress;

pub use aggregate::{Aggregator, VideoRecord};
pub use catalog::Part;
pub use error::{FetchError, TransportError};
pub use fetch::{FetchFailure, FetchOutcome, FetchSettings, FetchState, Fetcher};
