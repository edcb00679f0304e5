//! Episode-level change report between the previously published feed and
//! a freshly converted one.
//!
//! The scheduler that commits `feed.xml` uses this to write a readable
//! commit message. It never influences what gets converted.

use std::collections::HashMap;

use crate::feed::model::FeedDocument;
use crate::feed::parser::{parse, ParseError};

/// The fields an episode is compared on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeKey {
    pub guid: String,
    pub title: String,
    pub pub_date: String,
}

/// An episode whose GUID was already published but whose title or date moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedEpisode {
    pub previous: EpisodeKey,
    pub current: EpisodeKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<EpisodeKey>,
    pub updated: Vec<UpdatedEpisode>,
}

/// Extracts comparison keys in feed order. Missing values become empty.
pub fn episode_keys(doc: &FeedDocument) -> Vec<EpisodeKey> {
    doc.episodes
        .iter()
        .map(|ep| EpisodeKey {
            guid: ep.guid.clone().unwrap_or_default(),
            title: ep.title.clone(),
            pub_date: ep.pub_date.clone().unwrap_or_default(),
        })
        .collect()
}

/// Episodes added or changed in `converted` relative to the previously
/// published bytes.
///
/// A missing or unparsable previous file counts as empty, so every episode
/// is reported as added.
pub fn change_report(
    previous: Option<&[u8]>,
    converted: &[u8],
) -> Result<ChangeSet, ParseError> {
    let previous_keys = previous
        .and_then(|bytes| match parse(bytes) {
            Ok(doc) => Some(episode_keys(&doc)),
            Err(e) => {
                tracing::warn!(error = %e, "Existing output is not parsable, treating as empty");
                None
            }
        })
        .unwrap_or_default();
    let current = parse(converted)?;
    Ok(diff(&previous_keys, &episode_keys(&current)))
}

/// Compares two episode lists by GUID. Results follow `current` order.
pub fn diff(previous: &[EpisodeKey], current: &[EpisodeKey]) -> ChangeSet {
    let by_guid: HashMap<&str, &EpisodeKey> =
        previous.iter().map(|k| (k.guid.as_str(), k)).collect();

    let mut changes = ChangeSet::default();
    for key in current {
        match by_guid.get(key.guid.as_str()) {
            None => changes.added.push(key.clone()),
            Some(old) if *old != key => changes.updated.push(UpdatedEpisode {
                previous: (*old).clone(),
                current: key.clone(),
            }),
            Some(_) => {}
        }
    }
    changes
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty()
    }

    /// One-line summary, e.g. `New episode: Ep5` or
    /// `2 episode(s) added, 1 episode(s) updated`.
    pub fn commit_title(&self) -> String {
        if self.added.len() == 1 && self.updated.is_empty() {
            return format!("New episode: {}", self.added[0].title);
        }
        let mut parts = Vec::new();
        if !self.added.is_empty() {
            parts.push(format!("{} episode(s) added", self.added.len()));
        }
        if !self.updated.is_empty() {
            parts.push(format!("{} episode(s) updated", self.updated.len()));
        }
        parts.join(", ")
    }

    pub fn commit_body(&self) -> String {
        let mut lines = Vec::new();
        if !self.added.is_empty() {
            lines.push("New episodes:".to_string());
            for ep in &self.added {
                lines.push(format!("  + {} ({})", ep.title, ep.pub_date));
            }
        }
        if !self.updated.is_empty() {
            lines.push("Updated episodes:".to_string());
            for change in &self.updated {
                let (old, new) = (&change.previous, &change.current);
                lines.push(format!("  ~ {} ({})", new.title, new.pub_date));
                if old.title != new.title {
                    lines.push(format!("      title:   {} -> {}", old.title, new.title));
                }
                if old.pub_date != new.pub_date {
                    lines.push(format!("      pubDate: {} -> {}", old.pub_date, new.pub_date));
                }
            }
        }
        lines.join("\n")
    }

    /// Title, blank line, body.
    pub fn commit_message(&self) -> String {
        format!("{}\n\n{}", self.commit_title(), self.commit_body())
    }
}
