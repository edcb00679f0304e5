//! Maps a parsed source feed onto the Spotify-ready target schema.
//!
//! Carried-over fields are copied verbatim (minus characters XML cannot
//! hold). Target-only elements are derived from existing fields or filled
//! with fixed defaults:
//!
//! | Element | Value |
//! |---|---|
//! | `itunes:duration` | normalized to `HH:MM:SS` when recognizable |
//! | `itunes:episodeType` | source value if `full`/`trailer`/`bonus`, else `full` |
//! | `spotify:order` | source value, else 1-based feed position |
//! | `spotify:limit` | source value, else the configured episode limit |
//! | `spotify:countryOfOrigin` | source value, else the configured country |
//! | `spotify:email` | configured owner email, else source value, else omitted |
//! | `guid` | source value, else SHA-256 of enclosure URL, title and date |
//! | `atom:link rel="self"` | configured self URL, replacing the source one |
//!
//! Elements without a modelled field are passed through unchanged.

use chrono::DateTime;
use sha2::{Digest, Sha256};

use crate::config::{Config, ConfigError};
use crate::feed::model::{Channel, Episode, EpisodeType, FeedDocument, XmlElement, XmlNode};
use crate::feed::namespace;
use crate::util::strip_invalid_xml_chars;

/// Produces the target document from a parsed source document.
///
/// Episodes keep source order and are truncated to the configured limit,
/// keeping the first (most recent) ones. No episode is dropped for any
/// other reason.
///
/// # Errors
///
/// Only [`ConfigError::InvalidEpisodeLimit`], when the limit is not positive.
pub fn transform(doc: FeedDocument, config: &Config) -> Result<FeedDocument, ConfigError> {
    let limit = config.episode_limit()?.get();
    let FeedDocument { channel, episodes } = doc;
    let source_count = episodes.len();

    let episodes: Vec<Episode> = episodes
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, episode)| transform_episode(episode, index + 1))
        .collect();

    if source_count > episodes.len() {
        tracing::info!(
            source = source_count,
            kept = episodes.len(),
            limit = limit,
            "Truncated episode list to limit"
        );
    }

    Ok(FeedDocument {
        channel: transform_channel(channel, config, limit),
        episodes,
    })
}

fn transform_channel(mut ch: Channel, config: &Config, limit: usize) -> Channel {
    sanitize(&mut ch.title);
    for field in [
        &mut ch.link,
        &mut ch.description,
        &mut ch.language,
        &mut ch.copyright,
        &mut ch.pub_date,
        &mut ch.last_build_date,
        &mut ch.generator,
        &mut ch.author,
        &mut ch.summary,
        &mut ch.show_type,
        &mut ch.explicit,
        &mut ch.artwork_url,
        &mut ch.contact_email,
        &mut ch.episode_limit,
        &mut ch.country_of_origin,
    ] {
        sanitize_opt(field);
    }
    if let Some(owner) = ch.owner.as_mut() {
        sanitize_opt(&mut owner.name);
        sanitize_opt(&mut owner.email);
    }
    if let Some(image) = ch.image.as_mut() {
        sanitize(&mut image.url);
        sanitize_opt(&mut image.title);
        sanitize_opt(&mut image.link);
    }
    for category in &mut ch.categories {
        sanitize(&mut category.text);
        sanitize_opt(&mut category.subcategory);
    }
    ch.extra.iter_mut().for_each(sanitize_element);

    if let Some(date) = ch.pub_date.as_deref() {
        check_rfc2822("channel", date);
    }

    ch.self_url = config.self_url.clone();
    if ch.self_url.is_some() {
        ch.extra.retain(|el| !is_self_link(el));
    }

    if let Some(email) = config.owner_email() {
        ch.contact_email = Some(email.to_string());
        ch.owner.get_or_insert_with(Default::default).email = Some(email.to_string());
    }

    if ch.episode_limit.is_none() {
        ch.episode_limit = Some(limit.to_string());
    }

    if ch.country_of_origin.is_none() {
        let country = config.country_of_origin.trim();
        if !country.is_empty() {
            ch.country_of_origin = Some(country.to_ascii_lowercase());
        }
    }

    ch
}

fn transform_episode(mut ep: Episode, position: usize) -> Episode {
    sanitize(&mut ep.title);
    for field in [
        &mut ep.link,
        &mut ep.description,
        &mut ep.content,
        &mut ep.guid,
        &mut ep.pub_date,
        &mut ep.itunes_title,
        &mut ep.summary,
        &mut ep.author,
        &mut ep.duration,
        &mut ep.episode_number,
        &mut ep.season_number,
        &mut ep.episode_type,
        &mut ep.explicit,
        &mut ep.image_url,
        &mut ep.order,
    ] {
        sanitize_opt(field);
    }
    if let Some(enclosure) = ep.enclosure.as_mut() {
        sanitize(&mut enclosure.url);
        sanitize(&mut enclosure.length);
        sanitize(&mut enclosure.mime_type);
    }
    ep.extra.iter_mut().for_each(sanitize_element);

    if ep.enclosure.is_none() {
        tracing::warn!(
            title = %ep.title,
            position = position,
            "Episode has no enclosure, passing it through without one"
        );
    }

    if let Some(date) = ep.pub_date.as_deref() {
        check_rfc2822(&ep.title, date);
    }

    if ep.guid.is_none() {
        ep.guid = Some(fallback_guid(&ep));
        ep.guid_is_permalink = Some(false);
    }

    if let Some(raw) = ep.duration.take() {
        ep.duration = Some(format_duration(&raw).unwrap_or_else(|| {
            tracing::debug!(title = %ep.title, duration = %raw, "Unrecognized duration, keeping as-is");
            raw
        }));
    }

    let episode_type = ep
        .episode_type
        .as_deref()
        .and_then(EpisodeType::parse)
        .unwrap_or_default();
    ep.episode_type = Some(episode_type.as_str().to_string());

    if ep.order.is_none() {
        ep.order = Some(position.to_string());
    }

    ep
}

/// Normalizes an `itunes:duration` value to `HH:MM:SS`.
///
/// Accepts plain seconds (`"3725"`, fractional part dropped), `MM:SS` and
/// `HH:MM:SS`. Returns `None` for anything else, including values too large
/// to count in seconds.
pub fn format_duration(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split(':').collect();

    let total: u64 = match parts.as_slice() {
        [secs] => {
            let whole = secs.split_once('.').map_or(*secs, |(w, _)| w);
            parse_component(whole)?
        }
        [mins, secs] => parse_component(mins)?
            .checked_mul(60)?
            .checked_add(parse_clock_part(secs)?)?,
        [hours, mins, secs] => parse_component(hours)?
            .checked_mul(3600)?
            .checked_add(parse_clock_part(mins)? * 60 + parse_clock_part(secs)?)?,
        _ => return None,
    };

    Some(format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    ))
}

fn parse_component(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Minutes or seconds inside a clock value must be below 60.
fn parse_clock_part(s: &str) -> Option<u64> {
    parse_component(s).filter(|v| *v < 60)
}

/// Stable identifier for an item that has no `<guid>`.
///
/// Hashes enclosure URL, title and pubDate, so the same source item yields
/// the same GUID on every run.
pub fn fallback_guid(ep: &Episode) -> String {
    let input = format!(
        "{}|{}|{}",
        ep.enclosure.as_ref().map(|e| e.url.as_str()).unwrap_or(""),
        ep.title,
        ep.pub_date.as_deref().unwrap_or("")
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

/// Dates are carried verbatim; unparsable ones are only reported.
fn check_rfc2822(owner: &str, date: &str) {
    if let Err(e) = DateTime::parse_from_rfc2822(date) {
        tracing::warn!(item = %owner, date = %date, error = %e, "pubDate is not RFC 2822");
    }
}

fn is_self_link(el: &XmlElement) -> bool {
    el.is(namespace::ATOM, "link")
        && el
            .attribute("rel")
            .is_some_and(|rel| rel.trim().eq_ignore_ascii_case("self"))
}

fn sanitize_element(el: &mut XmlElement) {
    for (_, value) in &mut el.attributes {
        sanitize(value);
    }
    for child in &mut el.children {
        match child {
            XmlNode::Text(text) => sanitize(text),
            XmlNode::Element(inner) => sanitize_element(inner),
        }
    }
}

fn sanitize(value: &mut String) {
    if let std::borrow::Cow::Owned(clean) = strip_invalid_xml_chars(value) {
        *value = clean;
    }
}

fn sanitize_opt(value: &mut Option<String>) {
    if let Some(v) = value.as_mut() {
        sanitize(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::model::{Enclosure, Owner};
    use pretty_assertions::assert_eq;

    fn config() -> Config {
        Config::new("https://feed.podbean.com/example/feed.xml")
    }

    fn episode(title: &str) -> Episode {
        Episode {
            title: title.to_string(),
            guid: Some(format!("guid-{}", title)),
            pub_date: Some("Tue, 01 Oct 2024 08:00:00 +0000".to_string()),
            enclosure: Some(Enclosure {
                url: format!("https://cdn.example.com/{}.mp3", title),
                length: "100".to_string(),
                mime_type: "audio/mpeg".to_string(),
            }),
            ..Default::default()
        }
    }

    fn doc(titles: &[&str]) -> FeedDocument {
        FeedDocument {
            channel: Channel {
                title: "Example Podcast".to_string(),
                ..Default::default()
            },
            episodes: titles.iter().map(|t| episode(t)).collect(),
        }
    }

    fn titles(doc: &FeedDocument) -> Vec<&str> {
        doc.episodes.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn test_truncates_to_limit_keeping_first() {
        let mut config = config();
        config.episode_limit = 2;
        let out = transform(doc(&["Ep1", "Ep2", "Ep3"]), &config).unwrap();
        assert_eq!(titles(&out), vec!["Ep1", "Ep2"]);
        assert_eq!(out.channel.title, "Example Podcast");
    }

    #[test]
    fn test_limit_above_count_keeps_all() {
        let out = transform(doc(&["A", "B", "C"]), &config()).unwrap();
        assert_eq!(titles(&out), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_invalid_limit_is_config_error() {
        let mut config = config();
        config.episode_limit = 0;
        let result = transform(doc(&["A"]), &config);
        assert!(matches!(result, Err(ConfigError::InvalidEpisodeLimit(0))));
    }

    #[test]
    fn test_carried_fields_unchanged() {
        let source = doc(&["Ep1"]);
        let out = transform(source.clone(), &config()).unwrap();
        let (before, after) = (&source.episodes[0], &out.episodes[0]);
        assert_eq!(after.title, before.title);
        assert_eq!(after.pub_date, before.pub_date);
        assert_eq!(after.enclosure, before.enclosure);
        assert_eq!(after.guid, before.guid);
    }

    #[test]
    fn test_order_defaults_to_position() {
        let mut source = doc(&["A", "B", "C"]);
        source.episodes[1].order = Some("42".to_string());
        let out = transform(source, &config()).unwrap();
        let orders: Vec<_> = out.episodes.iter().map(|e| e.order.clone()).collect();
        assert_eq!(
            orders,
            vec![Some("1".into()), Some("42".into()), Some("3".into())]
        );
    }

    #[test]
    fn test_episode_type_defaults_to_full() {
        let mut source = doc(&["A", "B", "C"]);
        source.episodes[0].episode_type = Some("Trailer".to_string());
        source.episodes[1].episode_type = Some("teaser".to_string());
        let out = transform(source, &config()).unwrap();
        let types: Vec<_> = out
            .episodes
            .iter()
            .map(|e| e.episode_type.as_deref().unwrap())
            .collect();
        assert_eq!(types, vec!["trailer", "full", "full"]);
    }

    #[test]
    fn test_episode_without_enclosure_passes_through() {
        let mut source = doc(&["Announcement", "Ep1"]);
        source.episodes[0].enclosure = None;
        let out = transform(source, &config()).unwrap();
        assert_eq!(out.episodes.len(), 2);
        assert_eq!(out.episodes[0].enclosure, None);
        assert_eq!(out.episodes[0].order.as_deref(), Some("1"));
    }

    #[test]
    fn test_owner_email_only_when_configured() {
        let out = transform(doc(&["A"]), &config()).unwrap();
        assert_eq!(out.channel.contact_email, None);
        assert_eq!(out.channel.owner, None);

        let mut config = config();
        config.owner_email = Some(" host@example.com ".to_string());
        let out = transform(doc(&["A"]), &config).unwrap();
        assert_eq!(out.channel.contact_email.as_deref(), Some("host@example.com"));
        assert_eq!(
            out.channel.owner,
            Some(Owner {
                name: None,
                email: Some("host@example.com".into()),
            })
        );
    }

    #[test]
    fn test_owner_email_overrides_source_owner_email() {
        let mut source = doc(&["A"]);
        source.channel.owner = Some(Owner {
            name: Some("Jane".into()),
            email: Some("old@example.com".into()),
        });
        let mut config = config();
        config.owner_email = Some("new@example.com".into());

        let out = transform(source, &config).unwrap();
        let owner = out.channel.owner.unwrap();
        assert_eq!(owner.name.as_deref(), Some("Jane"));
        assert_eq!(owner.email.as_deref(), Some("new@example.com"));
    }

    #[test]
    fn test_spotify_channel_defaults() {
        let mut config = config();
        config.episode_limit = 7;
        let out = transform(doc(&["A"]), &config).unwrap();
        assert_eq!(out.channel.episode_limit.as_deref(), Some("7"));
        assert_eq!(out.channel.country_of_origin.as_deref(), Some("il"));
    }

    #[test]
    fn test_source_spotify_values_win_over_defaults() {
        let mut source = doc(&["A"]);
        source.channel.episode_limit = Some("50".into());
        source.channel.country_of_origin = Some("us".into());
        let out = transform(source, &config()).unwrap();
        assert_eq!(out.channel.episode_limit.as_deref(), Some("50"));
        assert_eq!(out.channel.country_of_origin.as_deref(), Some("us"));
    }

    #[test]
    fn test_empty_country_disables_element() {
        let mut config = config();
        config.country_of_origin = String::new();
        let out = transform(doc(&["A"]), &config).unwrap();
        assert_eq!(out.channel.country_of_origin, None);
    }

    #[test]
    fn test_missing_guid_gets_stable_fallback() {
        let mut source = doc(&["A"]);
        source.episodes[0].guid = None;
        let first = transform(source.clone(), &config()).unwrap();
        let second = transform(source, &config()).unwrap();

        let guid = first.episodes[0].guid.clone().unwrap();
        assert_eq!(guid.len(), 64);
        assert_eq!(second.episodes[0].guid.as_deref(), Some(guid.as_str()));
        assert_eq!(first.episodes[0].guid_is_permalink, Some(false));
    }

    #[test]
    fn test_duration_normalized() {
        let mut source = doc(&["A", "B", "C", "D"]);
        source.episodes[0].duration = Some("3725".into());
        source.episodes[1].duration = Some("45:07".into());
        source.episodes[2].duration = Some("about an hour".into());
        let out = transform(source, &config()).unwrap();
        let durations: Vec<_> = out.episodes.iter().map(|e| e.duration.as_deref()).collect();
        assert_eq!(
            durations,
            vec![
                Some("01:02:05"),
                Some("00:45:07"),
                Some("about an hour"),
                None
            ]
        );
    }

    #[test]
    fn test_format_duration_forms() {
        assert_eq!(format_duration("0").as_deref(), Some("00:00:00"));
        assert_eq!(format_duration("59").as_deref(), Some("00:00:59"));
        assert_eq!(format_duration("3600.75").as_deref(), Some("01:00:00"));
        assert_eq!(format_duration("90:05").as_deref(), Some("01:30:05"));
        assert_eq!(format_duration("1:02:03").as_deref(), Some("01:02:03"));
        assert_eq!(format_duration(" 12:00:00 ").as_deref(), Some("12:00:00"));
    }

    #[test]
    fn test_format_duration_rejects_garbage() {
        assert_eq!(format_duration(""), None);
        assert_eq!(format_duration("1:60"), None);
        assert_eq!(format_duration("1:2:3:4"), None);
        assert_eq!(format_duration("-5"), None);
        assert_eq!(format_duration("ten"), None);
    }

    #[test]
    fn test_format_duration_overflow_is_unrecognized() {
        assert_eq!(format_duration("18446744073709551615:00:00"), None);
        assert_eq!(format_duration("18446744073709551615:00"), None);
        assert_eq!(format_duration("99999999999999999999"), None);

        let mut source = doc(&["Long"]);
        source.episodes[0].duration = Some("18446744073709551615:00:00".into());
        let out = transform(source, &config()).unwrap();
        assert_eq!(
            out.episodes[0].duration.as_deref(),
            Some("18446744073709551615:00:00")
        );
    }

    fn atom_link(rel: &str, href: &str) -> XmlElement {
        XmlElement {
            namespace: Some(namespace::ATOM.to_string()),
            prefix: Some("atom".to_string()),
            local_name: "link".to_string(),
            attributes: vec![
                ("href".to_string(), href.to_string()),
                ("rel".to_string(), rel.to_string()),
            ],
            children: Vec::new(),
        }
    }

    #[test]
    fn test_source_self_link_replaced_when_configured() {
        let mut source = doc(&["A"]);
        source.channel.extra = vec![
            atom_link("self", "https://feed.podbean.com/example/feed.xml"),
            atom_link("hub", "https://pubsubhubbub.appspot.com/"),
        ];

        let kept = transform(source.clone(), &config()).unwrap();
        assert_eq!(kept.channel.extra.len(), 2);

        let mut config = config();
        config.self_url = Some("https://example.github.io/feed.xml".into());
        let out = transform(source, &config).unwrap();
        assert_eq!(
            out.channel.extra,
            vec![atom_link("hub", "https://pubsubhubbub.appspot.com/")]
        );
        assert_eq!(
            out.channel.self_url.as_deref(),
            Some("https://example.github.io/feed.xml")
        );
    }

    #[test]
    fn test_pass_through_elements_sanitized() {
        let mut source = doc(&["A"]);
        let mut keywords = atom_link("x", "y");
        keywords.namespace = Some(namespace::ITUNES.to_string());
        keywords.local_name = "keywords".to_string();
        keywords.attributes = vec![("lang".to_string(), "en\u{1}".to_string())];
        keywords.children = vec![XmlNode::Text("news,\u{0}daily".to_string())];
        source.episodes[0].extra.push(keywords);

        let out = transform(source, &config()).unwrap();
        let kept = &out.episodes[0].extra[0];
        assert_eq!(kept.attribute("lang"), Some("en"));
        assert_eq!(kept.text(), "news,daily");
    }

    #[test]
    fn test_invalid_xml_chars_stripped() {
        let mut source = doc(&["Ep\u{1}1"]);
        source.channel.description = Some("desc\u{0}".into());
        let out = transform(source, &config()).unwrap();
        assert_eq!(out.episodes[0].title, "Ep1");
        assert_eq!(out.channel.description.as_deref(), Some("desc"));
    }

    #[test]
    fn test_self_url_from_config() {
        let mut config = config();
        config.self_url = Some("https://example.github.io/feed.xml".into());
        let out = transform(doc(&[]), &config).unwrap();
        assert_eq!(
            out.channel.self_url.as_deref(),
            Some("https://example.github.io/feed.xml")
        );
    }
}
