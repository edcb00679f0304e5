//! In-memory records for one conversion run.
//!
//! A [`FeedDocument`] is built fresh from the fetched source, mapped by
//! `transform`, serialized, then dropped. Nothing here outlives a run.

/// Channel-level metadata of a podcast feed.
///
/// Optional fields are `None` when the source feed does not carry the
/// element; the writer omits them instead of emitting empty tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    pub pub_date: Option<String>,
    pub last_build_date: Option<String>,
    pub generator: Option<String>,
    /// `itunes:author`
    pub author: Option<String>,
    /// `itunes:summary`
    pub summary: Option<String>,
    /// `itunes:type` (`episodic` or `serial`)
    pub show_type: Option<String>,
    /// `itunes:explicit`
    pub explicit: Option<String>,
    pub owner: Option<Owner>,
    /// `itunes:image@href`, the show artwork.
    pub artwork_url: Option<String>,
    /// The plain RSS `<image>` block.
    pub image: Option<Image>,
    pub categories: Vec<Category>,
    /// `atom:link rel="self"`, only set for the republished location.
    pub self_url: Option<String>,
    /// `spotify:email`
    pub contact_email: Option<String>,
    /// `spotify:limit`
    pub episode_limit: Option<String>,
    /// `spotify:countryOfOrigin`
    pub country_of_origin: Option<String>,
    /// Source children with no field above, in document order.
    pub extra: Vec<XmlElement>,
}

/// `itunes:owner` contact block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Owner {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// RSS `<image>` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    pub title: Option<String>,
    pub link: Option<String>,
}

/// `itunes:category`, with at most one nested subcategory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub text: String,
    pub subcategory: Option<String>,
}

/// Media file attached to an episode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    /// Size in bytes as written by the source; kept as text so odd values
    /// pass through untouched.
    pub length: String,
    pub mime_type: String,
}

/// Classification emitted as `itunes:episodeType`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EpisodeType {
    #[default]
    Full,
    Trailer,
    Bonus,
}

impl EpisodeType {
    /// Parses a source value, case-insensitively. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Some(Self::Full),
            "trailer" => Some(Self::Trailer),
            "bonus" => Some(Self::Bonus),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Trailer => "trailer",
            Self::Bonus => "bonus",
        }
    }
}

/// One `<item>` of the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Episode {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    /// `content:encoded`
    pub content: Option<String>,
    pub guid: Option<String>,
    /// `guid@isPermaLink`; `None` when the attribute was absent.
    pub guid_is_permalink: Option<bool>,
    pub pub_date: Option<String>,
    /// `None` for items without a playable enclosure. Such items are kept.
    pub enclosure: Option<Enclosure>,
    /// `itunes:title`
    pub itunes_title: Option<String>,
    /// `itunes:summary`
    pub summary: Option<String>,
    /// `itunes:author`
    pub author: Option<String>,
    /// `itunes:duration`, raw in parsed documents and `HH:MM:SS` after transform.
    pub duration: Option<String>,
    /// `itunes:episode`
    pub episode_number: Option<String>,
    /// `itunes:season`
    pub season_number: Option<String>,
    /// Raw `itunes:episodeType` text from the source.
    pub episode_type: Option<String>,
    pub explicit: Option<String>,
    /// `itunes:image@href`
    pub image_url: Option<String>,
    /// `spotify:order`
    pub order: Option<String>,
    /// Source children with no field above, in document order.
    pub extra: Vec<XmlElement>,
}

/// A source element the converter has no field for.
///
/// Kept as a small tree so it can be written back unchanged: the namespace
/// is the resolved URI, and the writer picks the output prefix for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Resolved namespace URI; `None` for unprefixed RSS elements.
    pub namespace: Option<String>,
    /// Prefix as written in the source.
    pub prefix: Option<String>,
    pub local_name: String,
    /// Attributes in source order with unescaped values. `xmlns`
    /// declarations are not included.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True when the element has namespace `uri` and local name `name`.
    pub fn is(&self, uri: &str, name: &str) -> bool {
        self.namespace.as_deref() == Some(uri) && self.local_name == name
    }

    /// Concatenated text content of direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// A parsed or transformed feed: one channel plus its episodes in feed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub channel: Channel,
    pub episodes: Vec<Episode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_type_parse_is_case_insensitive() {
        assert_eq!(EpisodeType::parse("Trailer"), Some(EpisodeType::Trailer));
        assert_eq!(EpisodeType::parse(" BONUS "), Some(EpisodeType::Bonus));
        assert_eq!(EpisodeType::parse("full"), Some(EpisodeType::Full));
    }

    #[test]
    fn test_xml_element_accessors() {
        let element = XmlElement {
            namespace: Some("https://podcastindex.org/namespace/1.0".into()),
            prefix: Some("podcast".into()),
            local_name: "locked".into(),
            attributes: vec![("owner".into(), "host@example.com".into())],
            children: vec![XmlNode::Text("yes".into())],
        };
        assert!(element.is("https://podcastindex.org/namespace/1.0", "locked"));
        assert!(!element.is("https://podcastindex.org/namespace/1.0", "block"));
        assert_eq!(element.attribute("owner"), Some("host@example.com"));
        assert_eq!(element.attribute("missing"), None);
        assert_eq!(element.text(), "yes");
    }

    #[test]
    fn test_episode_type_unknown_value() {
        assert_eq!(EpisodeType::parse("teaser"), None);
        assert_eq!(EpisodeType::parse(""), None);
        assert_eq!(EpisodeType::default().as_str(), "full");
    }
}
