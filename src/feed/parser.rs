use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use thiserror::Error;

use crate::feed::model::{
    Category, Channel, Enclosure, Episode, FeedDocument, Image, Owner, XmlElement, XmlNode,
};
use crate::feed::namespace;

/// SEC-003: Maximum element nesting accepted from a source feed.
const MAX_FEED_DEPTH: usize = 64;

/// Errors raised while reading a source feed.
///
/// Every variant carries the byte offset reached in the input so a bad
/// upstream document can be inspected without re-fetching it.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("malformed XML at byte {offset}: {message}")]
    Xml { offset: u64, message: String },

    /// The document ended while elements were still open.
    #[error("unexpected end of document at byte {offset} ({open} element(s) still open)")]
    UnexpectedEof { offset: u64, open: usize },

    /// The document has no `<channel>` element.
    #[error("no <channel> element found (read {offset} bytes)")]
    MissingChannel { offset: u64 },

    /// SEC-003: nesting exceeds [`MAX_FEED_DEPTH`].
    #[error("element nesting exceeds {max} levels at byte {offset}")]
    MaxDepthExceeded { max: usize, offset: u64 },
}

/// Namespace of an element, resolved by URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    /// Unprefixed RSS element.
    Rss,
    Itunes,
    Spotify,
    Content,
    Atom,
    Other,
}

impl Ns {
    fn from_uri(uri: &[u8]) -> Self {
        match uri {
            u if u == namespace::ITUNES.as_bytes() => Ns::Itunes,
            u if u == namespace::SPOTIFY.as_bytes() => Ns::Spotify,
            u if u == namespace::CONTENT.as_bytes() => Ns::Content,
            u if u == namespace::ATOM.as_bytes() => Ns::Atom,
            _ => Ns::Other,
        }
    }

    /// Feeds occasionally use a well-known prefix without declaring it.
    fn from_undeclared_prefix(prefix: &[u8]) -> Self {
        match prefix {
            b"itunes" => Ns::Itunes,
            b"spotify" => Ns::Spotify,
            b"content" => Ns::Content,
            b"atom" => Ns::Atom,
            _ => Ns::Other,
        }
    }

    fn from_resolved(resolved: &ResolveResult<'_>) -> Self {
        match resolved {
            ResolveResult::Unbound => Ns::Rss,
            ResolveResult::Bound(Namespace(uri)) => Ns::from_uri(uri),
            ResolveResult::Unknown(prefix) => Ns::from_undeclared_prefix(prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tag {
    ns: Ns,
    name: String,
}

impl Tag {
    fn new(ns: Ns, local_name: &[u8]) -> Self {
        Self {
            ns,
            name: String::from_utf8_lossy(local_name).into_owned(),
        }
    }

    fn is(&self, ns: Ns, name: &str) -> bool {
        self.ns == ns && self.name == name
    }
}

/// Parses a source RSS document into a channel and its episodes.
///
/// Items keep their document order and none are dropped: an item without an
/// enclosure is returned with `enclosure: None`, and `<item/>` yields an
/// empty episode. Channel and item children with no model field are kept in
/// `extra` so they can be written back.
///
/// Input must be UTF-8. Text in any other encoding fails with
/// [`ParseError::Xml`] at the first byte that is not valid UTF-8; the
/// `encoding` declaration itself is not consulted.
///
/// # Errors
///
/// Returns [`ParseError`] when the bytes are not well-formed XML, end with
/// open elements, nest too deeply, or contain no `<channel>`.
///
/// # Security
///
/// SEC-002: quick-xml (0.37) does not parse `<!ENTITY>` declarations, so
/// custom entity references are rejected rather than expanded.
pub fn parse(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    // Text is trimmed once per field after CDATA and escaped runs are joined
    let mut reader = NsReader::from_reader(bytes);

    let mut builder = FeedBuilder::default();
    let mut buf = Vec::new();

    loop {
        let (ns, uri, event) = match reader.read_resolved_event_into(&mut buf) {
            Ok((resolved, event)) => (
                Ns::from_resolved(&resolved),
                namespace_uri(&resolved),
                event,
            ),
            Err(e) => {
                return Err(ParseError::Xml {
                    offset: reader.buffer_position() as u64,
                    message: e.to_string(),
                })
            }
        };
        let offset = reader.buffer_position() as u64;

        match event {
            Event::Start(e) => {
                if builder.path.len() >= MAX_FEED_DEPTH {
                    return Err(ParseError::MaxDepthExceeded {
                        max: MAX_FEED_DEPTH,
                        offset,
                    });
                }
                let tag = Tag::new(ns, e.local_name().as_ref());
                builder
                    .open(tag, uri, &e, false)
                    .map_err(|message| ParseError::Xml { offset, message })?;
            }
            Event::Empty(e) => {
                let tag = Tag::new(ns, e.local_name().as_ref());
                builder
                    .open(tag, uri, &e, true)
                    .map_err(|message| ParseError::Xml { offset, message })?;
            }
            Event::End(_) => builder.close(),
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| ParseError::Xml {
                    offset,
                    message: e.to_string(),
                })?;
                builder.push_text(&text);
            }
            Event::CData(c) => builder.push_text(&String::from_utf8_lossy(&c)),
            Event::Eof => {
                if !builder.path.is_empty() {
                    return Err(ParseError::UnexpectedEof {
                        offset,
                        open: builder.path.len(),
                    });
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    let offset = reader.buffer_position() as u64;
    builder
        .finish()
        .ok_or(ParseError::MissingChannel { offset })
}

/// Accumulates records while walking the event stream.
#[derive(Default)]
struct FeedBuilder {
    path: Vec<Tag>,
    text: String,
    channel: Option<Channel>,
    episodes: Vec<Episode>,
    current: Option<Episode>,
    image: Option<Image>,
    owner: Option<Owner>,
    /// Open `itunes:category` elements.
    category_depth: usize,
    /// Pass-through elements still open, outermost first.
    raw: Vec<XmlElement>,
    /// Whether the outermost pass-through element belongs to an item.
    raw_in_item: bool,
}

impl FeedBuilder {
    /// Handles a start tag. `empty` is true for self-closing elements, which
    /// get no matching [`FeedBuilder::close`] call.
    fn open(
        &mut self,
        tag: Tag,
        uri: Option<String>,
        e: &BytesStart<'_>,
        empty: bool,
    ) -> Result<(), String> {
        self.text.clear();
        let parent = self.path.last().cloned();
        let parent_is = |ns: Ns, name: &str| parent.as_ref().is_some_and(|p| p.is(ns, name));

        let in_item = parent_is(Ns::Rss, "item");
        let pass_through = !self.raw.is_empty()
            || (parent_is(Ns::Rss, "channel") && !is_channel_field(&tag))
            || (in_item && !is_item_field(&tag));

        if pass_through {
            let element = raw_element(&tag, uri, e)?;
            if self.raw.is_empty() {
                self.raw_in_item = in_item;
            }
            if empty {
                self.attach(element);
            } else {
                self.raw.push(element);
            }
        } else if tag.is(Ns::Rss, "channel") && self.channel.is_none() {
            self.channel = Some(Channel::default());
        } else if tag.is(Ns::Rss, "item") && parent_is(Ns::Rss, "channel") {
            if empty {
                self.episodes.push(Episode::default());
            } else {
                self.current = Some(Episode::default());
            }
        } else if tag.is(Ns::Rss, "image") && parent_is(Ns::Rss, "channel") {
            self.image = Some(Image::default());
        } else if tag.is(Ns::Itunes, "owner") && parent_is(Ns::Rss, "channel") {
            self.owner = Some(Owner::default());
        } else if tag.is(Ns::Rss, "enclosure") && parent_is(Ns::Rss, "item") {
            self.read_enclosure(e)?;
        } else if tag.is(Ns::Rss, "guid") && parent_is(Ns::Rss, "item") {
            if let (Some(ep), Some(value)) = (self.current.as_mut(), attribute(e, b"isPermaLink")?)
            {
                ep.guid_is_permalink = Some(!value.trim().eq_ignore_ascii_case("false"));
            }
        } else if tag.is(Ns::Itunes, "image") {
            let href = attribute(e, b"href")?.filter(|h| !h.trim().is_empty());
            if parent_is(Ns::Rss, "item") {
                if let Some(ep) = self.current.as_mut() {
                    ep.image_url = href;
                }
            } else if parent_is(Ns::Rss, "channel") {
                if let Some(ch) = self.channel.as_mut() {
                    ch.artwork_url = href;
                }
            }
        } else if tag.is(Ns::Itunes, "category") {
            self.read_category(e, parent_is(Ns::Rss, "channel"))?;
            if !empty {
                self.category_depth += 1;
            }
        }

        if !empty {
            self.path.push(tag);
        }
        Ok(())
    }

    fn close(&mut self) {
        let Some(tag) = self.path.pop() else {
            return;
        };
        if let Some(mut element) = self.raw.pop() {
            tidy_text(&mut element);
            self.attach(element);
            return;
        }
        let text = std::mem::take(&mut self.text);
        let value = non_empty(&text);
        let parent = self.path.last();
        let parent_is = |ns: Ns, name: &str| parent.is_some_and(|p| p.is(ns, name));

        if tag.is(Ns::Itunes, "category") {
            self.category_depth = self.category_depth.saturating_sub(1);
        } else if tag.is(Ns::Rss, "item") {
            if let Some(ep) = self.current.take() {
                self.episodes.push(ep);
            }
        } else if tag.is(Ns::Rss, "image") && parent_is(Ns::Rss, "channel") {
            if let (Some(ch), Some(image)) = (self.channel.as_mut(), self.image.take()) {
                if !image.url.is_empty() {
                    ch.image = Some(image);
                }
            }
        } else if tag.is(Ns::Itunes, "owner") && parent_is(Ns::Rss, "channel") {
            if let (Some(ch), Some(owner)) = (self.channel.as_mut(), self.owner.take()) {
                if owner.name.is_some() || owner.email.is_some() {
                    ch.owner = Some(owner);
                }
            }
        } else if parent_is(Ns::Rss, "item") {
            if let Some(ep) = self.current.as_mut() {
                assign_episode_field(ep, &tag, value);
            }
        } else if parent_is(Ns::Rss, "image") {
            if let Some(image) = self.image.as_mut() {
                match tag.name.as_str() {
                    "url" if tag.ns == Ns::Rss => image.url = value.unwrap_or_default(),
                    "title" if tag.ns == Ns::Rss => image.title = value,
                    "link" if tag.ns == Ns::Rss => image.link = value,
                    _ => {}
                }
            }
        } else if parent_is(Ns::Itunes, "owner") {
            if let Some(owner) = self.owner.as_mut() {
                match tag.name.as_str() {
                    "name" if tag.ns == Ns::Itunes => owner.name = value,
                    "email" if tag.ns == Ns::Itunes => owner.email = value,
                    _ => {}
                }
            }
        } else if parent_is(Ns::Rss, "channel") {
            if let Some(ch) = self.channel.as_mut() {
                assign_channel_field(ch, &tag, value);
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        match self.raw.last_mut() {
            Some(element) => match element.children.last_mut() {
                Some(XmlNode::Text(existing)) => existing.push_str(text),
                _ => element.children.push(XmlNode::Text(text.to_string())),
            },
            None => self.text.push_str(text),
        }
    }

    /// Hands a finished pass-through element to its parent.
    fn attach(&mut self, element: XmlElement) {
        if let Some(parent) = self.raw.last_mut() {
            parent.children.push(XmlNode::Element(element));
        } else if self.raw_in_item {
            if let Some(ep) = self.current.as_mut() {
                ep.extra.push(element);
            }
        } else if let Some(ch) = self.channel.as_mut() {
            ch.extra.push(element);
        }
    }

    fn read_enclosure(&mut self, e: &BytesStart<'_>) -> Result<(), String> {
        let Some(ep) = self.current.as_mut() else {
            return Ok(());
        };
        // Only the first enclosure of an item is used
        if ep.enclosure.is_some() {
            return Ok(());
        }
        let url = attribute(e, b"url")?.unwrap_or_default();
        if url.trim().is_empty() {
            return Ok(());
        }
        ep.enclosure = Some(Enclosure {
            url: url.trim().to_string(),
            length: attribute(e, b"length")?.unwrap_or_default(),
            mime_type: attribute(e, b"type")?.unwrap_or_default(),
        });
        Ok(())
    }

    fn read_category(&mut self, e: &BytesStart<'_>, top_level: bool) -> Result<(), String> {
        let Some(text) = attribute(e, b"text")?.filter(|t| !t.trim().is_empty()) else {
            return Ok(());
        };
        let Some(ch) = self.channel.as_mut() else {
            return Ok(());
        };
        if top_level && self.category_depth == 0 {
            ch.categories.push(Category {
                text,
                subcategory: None,
            });
        } else if self.category_depth == 1 {
            if let Some(last) = ch.categories.last_mut() {
                last.subcategory.get_or_insert(text);
            }
        }
        Ok(())
    }

    fn finish(self) -> Option<FeedDocument> {
        let channel = self.channel?;
        Some(FeedDocument {
            channel,
            episodes: self.episodes,
        })
    }
}

fn is_channel_field(tag: &Tag) -> bool {
    let name = tag.name.as_str();
    match tag.ns {
        Ns::Rss => matches!(
            name,
            "title"
                | "link"
                | "description"
                | "language"
                | "copyright"
                | "pubDate"
                | "lastBuildDate"
                | "generator"
                | "image"
                | "item"
        ),
        Ns::Itunes => matches!(
            name,
            "author" | "summary" | "type" | "explicit" | "owner" | "image" | "category"
        ),
        Ns::Spotify => matches!(name, "email" | "limit" | "countryOfOrigin"),
        _ => false,
    }
}

fn is_item_field(tag: &Tag) -> bool {
    let name = tag.name.as_str();
    match tag.ns {
        Ns::Rss => matches!(
            name,
            "title" | "link" | "description" | "guid" | "pubDate" | "enclosure"
        ),
        Ns::Content => name == "encoded",
        Ns::Itunes => matches!(
            name,
            "title"
                | "summary"
                | "author"
                | "duration"
                | "episode"
                | "season"
                | "episodeType"
                | "explicit"
                | "image"
        ),
        Ns::Spotify => name == "order",
        _ => false,
    }
}

/// URI of a resolved element name. Undeclared well-known prefixes map to
/// their usual URI.
fn namespace_uri(resolved: &ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Unbound => None,
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        ResolveResult::Unknown(prefix) => std::str::from_utf8(prefix)
            .ok()
            .and_then(namespace::required_uri)
            .map(str::to_string),
    }
}

fn raw_element(
    tag: &Tag,
    namespace: Option<String>,
    e: &BytesStart<'_>,
) -> Result<XmlElement, String> {
    let prefix = e
        .name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        attributes.push((key, value.into_owned()));
    }

    Ok(XmlElement {
        namespace,
        prefix,
        local_name: tag.name.clone(),
        attributes,
        children: Vec::new(),
    })
}

/// Drops indentation between child elements; a text-only element keeps its
/// text trimmed, like the modelled fields.
fn tidy_text(element: &mut XmlElement) {
    let has_elements = element
        .children
        .iter()
        .any(|c| matches!(c, XmlNode::Element(_)));
    if has_elements {
        element
            .children
            .retain(|c| !matches!(c, XmlNode::Text(t) if t.trim().is_empty()));
    } else {
        let text = element.text();
        let trimmed = text.trim();
        element.children = if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![XmlNode::Text(trimmed.to_string())]
        };
    }
}

fn assign_channel_field(ch: &mut Channel, tag: &Tag, value: Option<String>) {
    match (tag.ns, tag.name.as_str()) {
        (Ns::Rss, "title") => ch.title = value.unwrap_or_default(),
        (Ns::Rss, "link") => ch.link = value,
        (Ns::Rss, "description") => ch.description = value,
        (Ns::Rss, "language") => ch.language = value,
        (Ns::Rss, "copyright") => ch.copyright = value,
        (Ns::Rss, "pubDate") => ch.pub_date = value,
        (Ns::Rss, "lastBuildDate") => ch.last_build_date = value,
        (Ns::Rss, "generator") => ch.generator = value,
        (Ns::Itunes, "author") => ch.author = value,
        (Ns::Itunes, "summary") => ch.summary = value,
        (Ns::Itunes, "type") => ch.show_type = value,
        (Ns::Itunes, "explicit") => ch.explicit = value,
        (Ns::Spotify, "email") => ch.contact_email = value,
        (Ns::Spotify, "limit") => ch.episode_limit = value,
        (Ns::Spotify, "countryOfOrigin") => ch.country_of_origin = value,
        _ => {}
    }
}

fn assign_episode_field(ep: &mut Episode, tag: &Tag, value: Option<String>) {
    match (tag.ns, tag.name.as_str()) {
        (Ns::Rss, "title") => ep.title = value.unwrap_or_default(),
        (Ns::Rss, "link") => ep.link = value,
        (Ns::Rss, "description") => ep.description = value,
        (Ns::Rss, "guid") => ep.guid = value,
        (Ns::Rss, "pubDate") => ep.pub_date = value,
        (Ns::Content, "encoded") => ep.content = value,
        (Ns::Itunes, "title") => ep.itunes_title = value,
        (Ns::Itunes, "summary") => ep.summary = value,
        (Ns::Itunes, "author") => ep.author = value,
        (Ns::Itunes, "duration") => ep.duration = value,
        (Ns::Itunes, "episode") => ep.episode_number = value,
        (Ns::Itunes, "season") => ep.season_number = value,
        (Ns::Itunes, "episodeType") => ep.episode_type = value,
        (Ns::Itunes, "explicit") => ep.explicit = value,
        (Ns::Spotify, "order") => ep.order = value,
        _ => {}
    }
}

/// Reads and unescapes one attribute by qualified name.
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(|err| err.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
