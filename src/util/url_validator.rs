use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a feed URL taken from configuration.
///
/// Rejects anything that is not an absolute `http`/`https` URL with a
/// host. The source URL is operator-supplied, so loopback and private
/// addresses are allowed (mirrors and local test servers use them).
///
/// # Examples
///
/// ```
/// use podbridge::util::validate_url;
///
/// let url = validate_url("https://feed.podbean.com/show/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("feed.podbean.com"));
///
/// assert!(validate_url("file:///etc/passwd").is_err());
/// assert!(validate_url("feed.xml").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}
