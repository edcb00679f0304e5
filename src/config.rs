//! Converter configuration, read once at the start of each run.
//!
//! Values come from an optional TOML file; a missing file yields
//! `Config::default()`, which still needs a source URL before it validates.
//! Unknown keys are accepted by serde but logged as likely typos.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::namespace;
use crate::util::validate_url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("source_feed_url is not set")]
    MissingSourceUrl,

    #[error("source_feed_url '{url}' is invalid: {reason}")]
    InvalidSourceUrl { url: String, reason: String },

    #[error("self_url '{url}' is invalid: {reason}")]
    InvalidSelfUrl { url: String, reason: String },

    #[error("episode_limit must be a positive integer, got {0}")]
    InvalidEpisodeLimit(i64),

    #[error("fetch_timeout_secs must be greater than zero")]
    InvalidTimeout,

    #[error("owner_email '{0}' is not an email address")]
    InvalidOwnerEmail(String),

    #[error("namespace prefix '{0}' cannot be declared")]
    InvalidNamespacePrefix(String),

    #[error("namespace prefix '{prefix}' is reserved for {uri}")]
    NamespaceConflict { prefix: String, uri: String },
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Everything one conversion run needs.
///
/// All fields use `#[serde(default)]` so any subset of keys can be given.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed published by the podcast host.
    pub source_feed_url: String,

    /// Contact address emitted as `spotify:email` and `itunes:owner` email.
    /// Nothing is emitted when unset.
    pub owner_email: Option<String>,

    /// Maximum number of most-recent episodes kept in the output.
    pub episode_limit: i64,

    /// ISO 3166 code for `spotify:countryOfOrigin`; empty disables it.
    pub country_of_origin: String,

    /// Public URL of the republished feed, emitted as `atom:link rel="self"`.
    pub self_url: Option<String>,

    /// Destination of the converted document.
    pub output_path: PathBuf,

    /// Upper bound for the single fetch attempt.
    pub fetch_timeout_secs: u64,

    /// `User-Agent` sent to the host. Some hosts refuse bare clients.
    pub user_agent: String,

    /// Additional `xmlns:<prefix>` declarations, written after the
    /// built-in ones in prefix order.
    pub extra_namespaces: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_feed_url: String::new(),
            owner_email: None,
            episode_limit: Self::DEFAULT_EPISODE_LIMIT,
            country_of_origin: "il".to_string(),
            self_url: None,
            output_path: PathBuf::from("feed.xml"),
            fetch_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (compatible; podbridge)".to_string(),
            extra_namespaces: BTreeMap::new(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Spotify fetches at most this many episodes per request.
    pub const DEFAULT_EPISODE_LIMIT: i64 = 100;

    const KNOWN_KEYS: [&'static str; 9] = [
        "source_feed_url",
        "owner_email",
        "episode_limit",
        "country_of_origin",
        "self_url",
        "output_path",
        "fetch_timeout_secs",
        "user_agent",
        "extra_namespaces",
    ];

    /// Default configuration reading from `source_feed_url`.
    pub fn new(source_feed_url: impl Into<String>) -> Self {
        Self {
            source_feed_url: source_feed_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// Loading does not validate; call [`Config::validate`] once CLI
    /// overrides have been applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), source = %config.source_feed_url, "Loaded configuration");
        Ok(config)
    }

    /// Checks every value before any network access happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.source_feed_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingSourceUrl);
        }
        validate_url(url).map_err(|e| ConfigError::InvalidSourceUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(self_url) = &self.self_url {
            validate_url(self_url).map_err(|e| ConfigError::InvalidSelfUrl {
                url: self_url.clone(),
                reason: e.to_string(),
            })?;
        }

        self.episode_limit()?;

        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        if let Some(email) = &self.owner_email {
            if !looks_like_email(email) {
                return Err(ConfigError::InvalidOwnerEmail(email.clone()));
            }
        }

        for (prefix, uri) in &self.extra_namespaces {
            if !namespace::is_valid_prefix(prefix) || uri.trim().is_empty() {
                return Err(ConfigError::InvalidNamespacePrefix(prefix.clone()));
            }
            if let Some(required) = namespace::required_uri(prefix) {
                if required != uri {
                    return Err(ConfigError::NamespaceConflict {
                        prefix: prefix.clone(),
                        uri: required.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// The episode cap as a count.
    pub fn episode_limit(&self) -> Result<NonZeroUsize, ConfigError> {
        usize::try_from(self.episode_limit)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or(ConfigError::InvalidEpisodeLimit(self.episode_limit))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Owner email with surrounding whitespace removed; blank counts as unset.
    pub fn owner_email(&self) -> Option<&str> {
        self.owner_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Full `xmlns` table for the output root: the built-in declarations
    /// followed by extra ones not already covered.
    pub fn namespaces(&self) -> Vec<(String, String)> {
        let mut all: Vec<(String, String)> = namespace::REQUIRED
            .iter()
            .map(|(p, u)| (p.to_string(), u.to_string()))
            .collect();
        for (prefix, uri) in &self.extra_namespaces {
            if namespace::required_uri(prefix).is_none() {
                all.push((prefix.clone(), uri.clone()));
            }
        }
        all
    }
}

fn looks_like_email(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        // Blank is treated as "not configured"
        return true;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config::new("https://feed.podbean.com/example/feed.xml")
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.episode_limit, 100);
        assert_eq!(config.country_of_origin, "il");
        assert_eq!(config.output_path, PathBuf::from("feed.xml"));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert!(config.owner_email.is_none());
        assert!(config.extra_namespaces.is_empty());
    }

    #[test]
    fn test_default_requires_source_url() {
        let result = Config::default().validate();
        assert!(matches!(result, Err(ConfigError::MissingSourceUrl)));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_zero_episode_limit_rejected() {
        let mut config = valid();
        config.episode_limit = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEpisodeLimit(0))
        ));
    }

    #[test]
    fn test_negative_episode_limit_rejected() {
        let mut config = valid();
        config.episode_limit = -5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("-5"));
    }

    #[test]
    fn test_episode_limit_accessor() {
        let mut config = valid();
        config.episode_limit = 2;
        assert_eq!(config.episode_limit().unwrap().get(), 2);
    }

    #[test]
    fn test_non_http_source_rejected() {
        let config = Config::new("file:///etc/passwd");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSourceUrl { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = valid();
        config.fetch_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout)));
    }

    #[test]
    fn test_owner_email_validation() {
        let mut config = valid();
        config.owner_email = Some("host@example.com".into());
        assert!(config.validate().is_ok());

        config.owner_email = Some("not-an-email".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOwnerEmail(_))
        ));

        config.owner_email = Some("   ".into());
        assert!(config.validate().is_ok());
        assert_eq!(config.owner_email(), None);
    }

    #[test]
    fn test_extra_namespace_conflict_rejected() {
        let mut config = valid();
        config
            .extra_namespaces
            .insert("spotify".into(), "urn:other".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NamespaceConflict { .. })
        ));
    }

    #[test]
    fn test_extra_namespace_bad_prefix_rejected() {
        let mut config = valid();
        config
            .extra_namespaces
            .insert("bad prefix".into(), "urn:x".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNamespacePrefix(_))
        ));
    }

    #[test]
    fn test_namespaces_builtin_then_sorted_extras() {
        let mut config = valid();
        config
            .extra_namespaces
            .insert("rawvoice".into(), "http://www.rawvoice.com/rawvoiceRssModule/".into());
        config
            .extra_namespaces
            .insert("fireside".into(), "http://fireside.fm/modules/rss/fireside".into());
        config
            .extra_namespaces
            .insert("itunes".into(), namespace::ITUNES.into());

        let prefixes: Vec<String> = config.namespaces().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            prefixes,
            vec![
                "content", "wfw", "dc", "atom", "itunes", "googleplay", "spotify", "podcast",
                "media", "fireside", "rawvoice"
            ]
        );
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/podbridge_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.episode_limit, 100);
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("podbridge_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "  \n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.source_feed_url.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("podbridge_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
source_feed_url = "https://feed.podbean.com/example/feed.xml"
owner_email = "host@example.com"
episode_limit = 25
country_of_origin = "us"
self_url = "https://example.github.io/podcast/feed.xml"
output_path = "public/feed.xml"
fetch_timeout_secs = 10
user_agent = "custom-agent"

[extra_namespaces]
rawvoice = "http://www.rawvoice.com/rawvoiceRssModule/"
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.source_feed_url,
            "https://feed.podbean.com/example/feed.xml"
        );
        assert_eq!(config.owner_email(), Some("host@example.com"));
        assert_eq!(config.episode_limit, 25);
        assert_eq!(config.country_of_origin, "us");
        assert_eq!(config.output_path, PathBuf::from("public/feed.xml"));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.user_agent, "custom-agent");
        assert_eq!(config.extra_namespaces.len(), 1);
        assert!(config.validate().is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("podbridge_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = std::env::temp_dir().join("podbridge_config_test_wrongtype");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "episode_limit = \"many\"\n").unwrap();

        assert!(Config::load(&path).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("podbridge_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "episode_limit = 5\nspotify_limit = 9\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.episode_limit, 5);

        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("podbridge_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
