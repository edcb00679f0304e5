//! The conversion pipeline: fetch → parse → transform → serialize.
//!
//! [`run`] is the entry point a scheduler calls. It performs no filesystem
//! write; callers persist the returned bytes with [`publish_with_report`].
//! Any error aborts the run before output exists, so a failed run never
//! replaces a good published feed.

use std::path::Path;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::feed::{self, ChangeSet, FetchError, ParseError, SerializeError};
use crate::output::{self, PublishOutcome, WriteError};

/// Any failure of a conversion run.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to parse source feed: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Converts raw source bytes into the target document.
///
/// Pure: no network and no filesystem access.
pub fn convert(source: &[u8], config: &Config) -> Result<Vec<u8>, ConvertError> {
    let parsed = feed::parse(source)?;
    tracing::debug!(
        title = %parsed.channel.title,
        episodes = parsed.episodes.len(),
        "Parsed source feed"
    );

    let target = feed::transform(parsed, config)?;
    let bytes = feed::serialize(&target, &config.namespaces())?;

    tracing::info!(
        episodes = target.episodes.len(),
        bytes = bytes.len(),
        "Converted feed"
    );
    Ok(bytes)
}

/// Runs one conversion against the configured source feed.
///
/// An invalid configuration fails with [`ConvertError::Config`] before any
/// request is made.
pub async fn run(config: &Config) -> Result<Vec<u8>, ConvertError> {
    let client = feed::build_client(config)?;
    run_with_client(&client, config).await
}

/// [`run`] with a caller-supplied HTTP client. Validates the configuration.
pub async fn run_with_client(
    client: &reqwest::Client,
    config: &Config,
) -> Result<Vec<u8>, ConvertError> {
    config.validate()?;
    let source = feed::fetch(client, config.source_feed_url.trim(), config.fetch_timeout()).await?;
    convert(&source, config)
}

/// What [`publish_with_report`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub outcome: PublishOutcome,
    /// Episodes added or updated relative to the file that was replaced.
    pub changes: ChangeSet,
}

/// Publishes converted bytes to `path` and reports episode changes against
/// the file it replaces.
///
/// The commit message goes to `commit_message` only when the file was
/// written and at least one episode was added or updated.
pub fn publish_with_report(
    path: &Path,
    converted: &[u8],
    commit_message: Option<&Path>,
) -> Result<Publication, ConvertError> {
    let previous = output::read_existing(path);
    let changes = feed::change_report(previous.as_deref(), converted)?;
    let outcome = output::publish(path, converted)?;

    if outcome == PublishOutcome::Written && !changes.is_empty() {
        if let Some(message_path) = commit_message {
            output::write_atomic(message_path, changes.commit_message().as_bytes())?;
            tracing::info!(path = %message_path.display(), "Wrote commit message");
        }
    }

    Ok(Publication { outcome, changes })
}
