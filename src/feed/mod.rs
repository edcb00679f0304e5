//! Podcast feed handling: retrieval, parsing, mapping and serialization.
//!
//! # Architecture
//!
//! - [`fetcher`] - Single-attempt HTTP retrieval of the source feed
//! - [`parser`] - Namespace-aware RSS parsing with `quick-xml`
//! - [`transform`] - Mapping onto the Spotify target schema
//! - [`writer`] - Deterministic RSS serialization
//! - [`changes`] - Episode diff between two published versions
//!
//! # Example
//!
//! ```ignore
//! use podbridge::feed::{parse, serialize, transform};
//!
//! let doc = transform(parse(&bytes)?, &config)?;
//! let xml = serialize(&doc, &config.namespaces())?;
//! ```

pub mod changes;
mod fetcher;
pub mod model;
pub mod namespace;
mod parser;
mod transform;
mod writer;

pub use changes::{change_report, diff, episode_keys, ChangeSet, EpisodeKey};
pub use fetcher::{build_client, fetch, FetchError};
pub use model::{
    Category, Channel, Enclosure, Episode, EpisodeType, FeedDocument, Image, Owner, XmlElement,
    XmlNode,
};
pub use parser::{parse, ParseError};
pub use transform::{fallback_guid, format_duration, transform};
pub use writer::{serialize, SerializeError};
