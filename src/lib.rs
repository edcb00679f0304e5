//! Republishes a hosted podcast RSS feed as a Spotify-ready feed.
//!
//! One run fetches the host's feed, parses it into a channel and its
//! episodes, adds the `itunes:`/`spotify:` elements Spotify ingests,
//! truncates to the configured episode limit and serializes the result
//! deterministically, so an unchanged source yields byte-identical output.

pub mod config;
pub mod converter;
pub mod feed;
pub mod output;
pub mod util;

pub use config::{Config, ConfigError};
pub use converter::{
    convert, publish_with_report, run, run_with_client, ConvertError, Publication,
};
pub use output::{publish, write_atomic, PublishOutcome, WriteError};
