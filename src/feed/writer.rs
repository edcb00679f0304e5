use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use thiserror::Error;

use crate::feed::model::{Channel, Episode, FeedDocument, XmlElement, XmlNode};

/// Writing into an in-memory buffer; only reachable on writer bugs.
#[derive(Debug, Error)]
#[error("Failed to serialize feed: {0}")]
pub struct SerializeError(String);

/// Serializes a target document as an RSS 2.0 byte stream.
///
/// The root `<rss>` declares every `(prefix, uri)` pair of `namespaces` in
/// the given order. Channel and item children are written in a fixed order
/// and optional fields are omitted rather than written empty, so identical
/// input always produces identical bytes. Pass-through elements follow the
/// modelled ones in their source order.
///
/// # Arguments
///
/// * `doc` - Transformed channel and episodes
/// * `namespaces` - `xmlns` declarations for the root, see `Config::namespaces`
pub fn serialize(
    doc: &FeedDocument,
    namespaces: &[(String, String)],
) -> Result<Vec<u8>, SerializeError> {
    let mut out = FeedWriter::new(namespaces);

    out.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    for (prefix, uri) in namespaces {
        let key = format!("xmlns:{}", prefix);
        rss.push_attribute((key.as_str(), uri.as_str()));
    }
    out.emit(Event::Start(rss))?;
    out.start("channel")?;

    out.write_channel(&doc.channel)?;
    for episode in &doc.episodes {
        out.write_episode(episode)?;
    }

    out.end("channel")?;
    out.end("rss")?;

    let mut bytes = out.writer.into_inner().into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

struct FeedWriter<'a> {
    writer: Writer<Cursor<Vec<u8>>>,
    namespaces: &'a [(String, String)],
}

impl<'a> FeedWriter<'a> {
    fn new(namespaces: &'a [(String, String)]) -> Self {
        Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
            namespaces,
        }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), SerializeError> {
        self.writer
            .write_event(event)
            .map_err(|e| SerializeError(e.to_string()))
    }

    fn start(&mut self, name: &str) -> Result<(), SerializeError> {
        self.emit(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), SerializeError> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), SerializeError> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.emit(Event::Empty(el))
    }

    fn text(&mut self, name: &str, text: &str) -> Result<(), SerializeError> {
        self.start(name)?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn opt_text(&mut self, name: &str, text: Option<&str>) -> Result<(), SerializeError> {
        match text {
            Some(text) => self.text(name, text),
            None => Ok(()),
        }
    }

    fn write_channel(&mut self, ch: &Channel) -> Result<(), SerializeError> {
        self.text("title", &ch.title)?;
        self.opt_text("link", ch.link.as_deref())?;
        self.opt_text("description", ch.description.as_deref())?;
        self.opt_text("language", ch.language.as_deref())?;
        self.opt_text("copyright", ch.copyright.as_deref())?;
        self.opt_text("pubDate", ch.pub_date.as_deref())?;
        self.opt_text("lastBuildDate", ch.last_build_date.as_deref())?;
        self.opt_text("generator", ch.generator.as_deref())?;
        if let Some(href) = ch.self_url.as_deref() {
            self.empty(
                "atom:link",
                &[("href", href), ("rel", "self"), ("type", "application/rss+xml")],
            )?;
        }
        self.opt_text("itunes:author", ch.author.as_deref())?;
        self.opt_text("itunes:summary", ch.summary.as_deref())?;
        self.opt_text("itunes:type", ch.show_type.as_deref())?;
        self.opt_text("itunes:explicit", ch.explicit.as_deref())?;
        if let Some(owner) = &ch.owner {
            self.start("itunes:owner")?;
            self.opt_text("itunes:name", owner.name.as_deref())?;
            self.opt_text("itunes:email", owner.email.as_deref())?;
            self.end("itunes:owner")?;
        }
        if let Some(href) = ch.artwork_url.as_deref() {
            self.empty("itunes:image", &[("href", href)])?;
        }
        if let Some(image) = &ch.image {
            self.start("image")?;
            self.text("url", &image.url)?;
            self.opt_text("title", image.title.as_deref())?;
            self.opt_text("link", image.link.as_deref())?;
            self.end("image")?;
        }
        for category in &ch.categories {
            match category.subcategory.as_deref() {
                Some(sub) => {
                    let mut el = BytesStart::new("itunes:category");
                    el.push_attribute(("text", category.text.as_str()));
                    self.emit(Event::Start(el))?;
                    self.empty("itunes:category", &[("text", sub)])?;
                    self.end("itunes:category")?;
                }
                None => self.empty("itunes:category", &[("text", category.text.as_str())])?,
            }
        }
        self.opt_text("spotify:email", ch.contact_email.as_deref())?;
        self.opt_text("spotify:limit", ch.episode_limit.as_deref())?;
        self.opt_text("spotify:countryOfOrigin", ch.country_of_origin.as_deref())?;
        for element in &ch.extra {
            self.write_extra(element, false)?;
        }
        Ok(())
    }

    fn write_episode(&mut self, ep: &Episode) -> Result<(), SerializeError> {
        self.start("item")?;
        self.text("title", &ep.title)?;
        self.opt_text("link", ep.link.as_deref())?;
        self.opt_text("description", ep.description.as_deref())?;
        self.opt_text("content:encoded", ep.content.as_deref())?;
        if let Some(guid) = ep.guid.as_deref() {
            let mut el = BytesStart::new("guid");
            if let Some(permalink) = ep.guid_is_permalink {
                el.push_attribute(("isPermaLink", if permalink { "true" } else { "false" }));
            }
            self.emit(Event::Start(el))?;
            self.emit(Event::Text(BytesText::new(guid)))?;
            self.end("guid")?;
        }
        self.opt_text("pubDate", ep.pub_date.as_deref())?;
        if let Some(enclosure) = &ep.enclosure {
            self.empty(
                "enclosure",
                &[
                    ("url", enclosure.url.as_str()),
                    ("length", enclosure.length.as_str()),
                    ("type", enclosure.mime_type.as_str()),
                ],
            )?;
        }
        self.opt_text("itunes:title", ep.itunes_title.as_deref())?;
        self.opt_text("itunes:summary", ep.summary.as_deref())?;
        self.opt_text("itunes:author", ep.author.as_deref())?;
        if let Some(href) = ep.image_url.as_deref() {
            self.empty("itunes:image", &[("href", href)])?;
        }
        self.opt_text("itunes:duration", ep.duration.as_deref())?;
        self.opt_text("itunes:episode", ep.episode_number.as_deref())?;
        self.opt_text("itunes:season", ep.season_number.as_deref())?;
        self.opt_text("itunes:episodeType", ep.episode_type.as_deref())?;
        self.opt_text("itunes:explicit", ep.explicit.as_deref())?;
        self.opt_text("spotify:order", ep.order.as_deref())?;
        for element in &ep.extra {
            self.write_extra(element, false)?;
        }
        self.end("item")
    }

    /// Writes a pass-through element. Namespaces in the root table use the
    /// root's prefix; any other namespace is declared on the element itself.
    /// `default_ns` is true inside an element that declared a default
    /// namespace.
    fn write_extra(&mut self, el: &XmlElement, default_ns: bool) -> Result<(), SerializeError> {
        let (name, declaration) = self.qualified_name(el);
        let mut children_default_ns = default_ns;

        let mut start = BytesStart::new(name.as_str());
        match declaration {
            Some((key, uri)) => {
                if key == "xmlns" {
                    children_default_ns = true;
                }
                start.push_attribute((key.as_str(), uri));
            }
            None if default_ns && el.namespace.is_none() && el.prefix.is_none() => {
                start.push_attribute(("xmlns", ""));
                children_default_ns = false;
            }
            None => {}
        }
        for (key, value) in &el.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if el.children.is_empty() {
            return self.emit(Event::Empty(start));
        }
        self.emit(Event::Start(start))?;
        for child in &el.children {
            match child {
                XmlNode::Text(text) => self.emit(Event::Text(BytesText::new(text)))?,
                XmlNode::Element(inner) => self.write_extra(inner, children_default_ns)?,
            }
        }
        self.end(&name)
    }

    /// Output name of a pass-through element, plus the `xmlns` attribute it
    /// needs when its namespace is not declared on the root.
    fn qualified_name<'e>(&self, el: &'e XmlElement) -> (String, Option<(String, &'e str)>) {
        let local = el.local_name.as_str();
        let Some(uri) = el.namespace.as_deref() else {
            let name = match el.prefix.as_deref() {
                Some(prefix) => format!("{}:{}", prefix, local),
                None => local.to_string(),
            };
            return (name, None);
        };

        if let Some((prefix, _)) = self.namespaces.iter().find(|(_, u)| u == uri) {
            return (format!("{}:{}", prefix, local), None);
        }
        match el.prefix.as_deref() {
            Some(prefix) => (
                format!("{}:{}", prefix, local),
                Some((format!("xmlns:{}", prefix), uri)),
            ),
            None => (local.to_string(), Some(("xmlns".to_string(), uri))),
        }
    }
}
