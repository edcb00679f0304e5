//! XML namespaces the output feed declares on its `<rss>` root.

pub const CONTENT: &str = "http://purl.org/rss/1.0/modules/content/";
pub const WFW: &str = "http://wellformedweb.org/CommentAPI/";
pub const DC: &str = "http://purl.org/dc/elements/1.1/";
pub const ATOM: &str = "http://www.w3.org/2005/Atom";
pub const ITUNES: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
pub const GOOGLEPLAY: &str = "http://www.google.com/schemas/play-podcasts/1.0";
pub const SPOTIFY: &str = "http://www.spotify.com/ns/rss";
pub const PODCAST: &str = "https://podcastindex.org/namespace/1.0";
pub const MEDIA: &str = "http://search.yahoo.com/mrss/";

/// Declarations Spotify's ingestion expects, in emission order.
///
/// These are always written, even when the source feed declares none of
/// them, because the writer emits `itunes:`, `spotify:`, `content:` and
/// `atom:` elements under exactly these prefixes.
pub const REQUIRED: [(&str, &str); 9] = [
    ("content", CONTENT),
    ("wfw", WFW),
    ("dc", DC),
    ("atom", ATOM),
    ("itunes", ITUNES),
    ("googleplay", GOOGLEPLAY),
    ("spotify", SPOTIFY),
    ("podcast", PODCAST),
    ("media", MEDIA),
];

/// Returns the URI bound to `prefix` in [`REQUIRED`], if any.
pub fn required_uri(prefix: &str) -> Option<&'static str> {
    REQUIRED
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, uri)| *uri)
}

/// Checks that `prefix` can be written as `xmlns:<prefix>`.
///
/// Accepts an ASCII letter or `_` followed by letters, digits, `-`, `_` or
/// `.`. Prefixes starting with `xml` (any case) are reserved.
pub fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if prefix.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("xml")) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
