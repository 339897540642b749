// src/feed/mod.rs
//! Item -> RSS 2.0 document.
//!
//! `build` is pure and deterministic (the build instant is passed in).
//! `to_xml` writes every piece of user text either as escaped character data
//! or as CDATA holding HTML-escaped text, so nothing a post contains can be
//! read as markup by a feed reader.

pub mod store;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;

use crate::ingest::types::Item;

pub const TITLE_MAX_CHARS: usize = 100;
pub const ELLIPSIS: &str = "...";
const GENERATOR: &str = concat!("listfeed/", env!("CARGO_PKG_VERSION"));

/// Channel-level metadata, taken from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMeta {
    pub title: String,
    pub description: String,
    pub link: String,
    pub ttl_minutes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Repost,
    Reply,
    Item,
}

impl Category {
    pub fn of(item: &Item) -> Self {
        if item.is_repost {
            Category::Repost
        } else if item.is_reply {
            Category::Reply
        } else {
            Category::Item
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Repost => "repost",
            Category::Reply => "reply",
            Category::Item => "item",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: String,
    pub guid: String,
    pub author: String,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub description: String,
    pub link: String,
    pub last_build_date: String,
    pub ttl_minutes: u64,
    pub items: Vec<FeedItem>,
}

/// Render `items` in the order given.
pub fn build(items: &[Item], meta: &FeedMeta, built_at: DateTime<Utc>) -> FeedDocument {
    FeedDocument {
        title: meta.title.clone(),
        description: meta.description.clone(),
        link: meta.link.clone(),
        last_build_date: built_at.to_rfc2822(),
        ttl_minutes: meta.ttl_minutes,
        items: items.iter().map(render_item).collect(),
    }
}

pub fn render_item(item: &Item) -> FeedItem {
    FeedItem {
        title: title_for(item),
        description: description_for(item),
        link: item.url.clone(),
        pub_date: item.created_at.to_rfc2822(),
        guid: item.id.clone(),
        author: format!("{} (@{})", item.author.display_name, item.author.handle),
        category: Category::of(item),
    }
}

/// `@handle: body`, with the body cut to 100 chars plus an ellipsis.
pub fn title_for(item: &Item) -> String {
    if item.text.is_empty() {
        format!("@{}", item.author.handle)
    } else {
        format!("@{}: {}", item.author.handle, truncate_chars(&item.text, TITLE_MAX_CHARS))
    }
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}{ELLIPSIS}", &s[..cut]),
    }
}

fn escape_multiline(text: &str) -> String {
    html_escape::encode_text(text)
        .lines()
        .collect::<Vec<_>>()
        .join("<br/>")
}

pub fn description_for(item: &Item) -> String {
    let mut out = escape_multiline(&item.text);

    if !item.media.is_empty() {
        let n = item.media.len();
        let noun = if n == 1 { "attachment" } else { "attachments" };
        out.push_str(&format!("<br/><br/>[{n} media {noun}]"));
    }

    let e = item.engagement;
    if !e.is_empty() {
        out.push_str(&format!(
            "<br/><br/>Likes: {} · Reposts: {} · Replies: {}",
            e.likes, e.reposts, e.replies
        ));
    }

    if let Some(thread) = item.thread.as_deref().filter(|t| !t.is_empty()) {
        out.push_str("<br/><br/><hr/><p>Thread:</p>");
        for node in thread {
            out.push_str(&format!(
                "<p>@{}: {}</p>",
                html_escape::encode_text(&node.author.handle),
                escape_multiline(&node.text)
            ));
        }
    }
    out
}

/// XML 1.0 forbids most C0 controls even inside CDATA.
fn xml_safe(s: &str) -> String {
    s.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r') || !c.is_control() || *c as u32 >= 0x80)
        .collect()
}

fn write_text<W: std::io::Write>(w: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(&xml_safe(text))))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// CDATA cannot contain `]]>`; split it across two sections.
fn write_cdata<W: std::io::Write>(w: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    let text = xml_safe(text);
    w.write_event(Event::Start(BytesStart::new(name)))?;
    let mut rest = text.as_str();
    while let Some(pos) = rest.find("]]>") {
        w.write_event(Event::CData(BytesCData::new(&rest[..pos + 2])))?;
        rest = &rest[pos + 2..];
    }
    w.write_event(Event::CData(BytesCData::new(rest)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

impl FeedDocument {
    pub fn to_xml(&self) -> Result<String> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        w.write_event(Event::Start(
            BytesStart::new("rss").with_attributes([("version", "2.0")]),
        ))?;
        w.write_event(Event::Start(BytesStart::new("channel")))?;

        write_text(&mut w, "title", &self.title)?;
        write_text(&mut w, "description", &self.description)?;
        write_text(&mut w, "link", &self.link)?;
        write_text(&mut w, "lastBuildDate", &self.last_build_date)?;
        write_text(&mut w, "generator", GENERATOR)?;
        write_text(&mut w, "ttl", &self.ttl_minutes.to_string())?;

        for it in &self.items {
            w.write_event(Event::Start(BytesStart::new("item")))?;
            write_cdata(&mut w, "title", &it.title)?;
            write_cdata(&mut w, "description", &it.description)?;
            write_text(&mut w, "link", &it.link)?;
            write_text(&mut w, "pubDate", &it.pub_date)?;
            w.write_event(Event::Start(
                BytesStart::new("guid").with_attributes([("isPermaLink", "false")]),
            ))?;
            w.write_event(Event::Text(BytesText::new(&xml_safe(&it.guid))))?;
            w.write_event(Event::End(BytesEnd::new("guid")))?;
            write_text(&mut w, "author", &it.author)?;
            write_text(&mut w, "category", it.category.as_str())?;
            w.write_event(Event::End(BytesEnd::new("item")))?;
        }

        w.write_event(Event::End(BytesEnd::new("channel")))?;
        w.write_event(Event::End(BytesEnd::new("rss")))?;

        String::from_utf8(w.into_inner()).context("feed xml is not utf-8")
    }

    /// Read a rendered document back. Unknown elements are ignored.
    pub fn parse(xml: &str) -> Result<Self> {
        let rss: RssXml = quick_xml::de::from_str(xml).context("parsing feed xml")?;
        let ch = rss.channel;
        Ok(FeedDocument {
            title: ch.title,
            description: ch.description,
            link: ch.link,
            last_build_date: ch.last_build_date.unwrap_or_default(),
            ttl_minutes: ch.ttl.unwrap_or_default(),
            items: ch
                .item
                .into_iter()
                .map(|it| FeedItem {
                    title: it.title.unwrap_or_default(),
                    description: it.description.unwrap_or_default(),
                    link: it.link.unwrap_or_default(),
                    pub_date: it.pub_date.unwrap_or_default(),
                    guid: it.guid.map(|g| g.value).unwrap_or_default(),
                    author: it.author.unwrap_or_default(),
                    category: match it.category.as_deref() {
                        Some("repost") => Category::Repost,
                        Some("reply") => Category::Reply,
                        _ => Category::Item,
                    },
                })
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RssXml {
    channel: ChannelXml,
}

#[derive(Debug, Deserialize)]
struct ChannelXml {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    link: String,
    #[serde(rename = "lastBuildDate")]
    last_build_date: Option<String>,
    ttl: Option<u64>,
    #[serde(default)]
    item: Vec<ItemXml>,
}

#[derive(Debug, Deserialize)]
struct ItemXml {
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    guid: Option<GuidXml>,
    author: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuidXml {
    #[serde(rename = "$text")]
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::normalize::normalize;
    use crate::ingest::types::{Engagement, Media, MediaKind, RawId, RawItem};
    use chrono::TimeZone;

    fn meta() -> FeedMeta {
        FeedMeta {
            title: "Lists".into(),
            description: "Aggregated".into(),
            link: "https://x.com".into(),
            ttl_minutes: 30,
        }
    }

    fn item(id: &str, handle: &str, text: &str) -> Item {
        normalize(
            RawItem {
                id: Some(RawId::Text(id.into())),
                username: Some(handle.into()),
                name: Some("Some Name".into()),
                text: Some(text.into()),
                ..Default::default()
            },
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn short_title_is_not_truncated() {
        let it = item("1", "amy", "hello world");
        assert_eq!(title_for(&it), "@amy: hello world");
    }

    #[test]
    fn long_title_is_cut_at_100_chars_plus_ellipsis() {
        let it = item("1", "amy", &"é".repeat(300));
        let title = title_for(&it);
        assert_eq!(title, format!("@amy: {}{ELLIPSIS}", "é".repeat(TITLE_MAX_CHARS)));

        let exact = "x".repeat(TITLE_MAX_CHARS);
        assert_eq!(truncate_chars(&exact, TITLE_MAX_CHARS), exact);
    }

    #[test]
    fn body_of_exactly_100_chars_is_kept_whole() {
        let body = "b".repeat(TITLE_MAX_CHARS);
        let title = title_for(&item("1", "alice", &body));
        assert_eq!(title, format!("@alice: {body}"));
        assert!(!title.ends_with(ELLIPSIS));

        let body = "c".repeat(TITLE_MAX_CHARS + 1);
        let title = title_for(&item("1", "alice", &body));
        assert_eq!(title, format!("@alice: {}{ELLIPSIS}", "c".repeat(TITLE_MAX_CHARS)));
    }

    #[test]
    fn empty_body_title_is_just_the_handle() {
        assert_eq!(title_for(&item("1", "amy", "")), "@amy");
    }

    #[test]
    fn category_prefers_repost_over_reply() {
        let mut it = item("1", "amy", "x");
        assert_eq!(Category::of(&it), Category::Item);
        it.is_reply = true;
        assert_eq!(Category::of(&it), Category::Reply);
        it.is_repost = true;
        assert_eq!(Category::of(&it), Category::Repost);
    }

    #[test]
    fn description_escapes_markup_and_adds_annotations() {
        let mut it = item("1", "amy", "<script>alert(1)</script>\nline two");
        it.media = vec![
            Media {
                kind: MediaKind::Photo,
                url: "p".into(),
            },
            Media {
                kind: MediaKind::Video,
                url: "v".into(),
            },
        ];
        it.engagement = Engagement {
            likes: 5,
            reposts: 0,
            replies: 2,
        };
        it.thread = Some(vec![item("2", "bob", "a < b")]);

        let d = description_for(&it);
        assert!(!d.contains("<script>"));
        assert!(d.starts_with("&lt;script&gt;alert(1)&lt;/script&gt;<br/>line two"));
        assert!(d.contains("[2 media attachments]"));
        assert!(d.contains("Likes: 5 · Reposts: 0 · Replies: 2"));
        assert!(d.contains("<p>@bob: a &lt; b</p>"));
    }

    #[test]
    fn plain_item_has_no_annotations() {
        let d = description_for(&item("1", "amy", "just text"));
        assert_eq!(d, "just text");
    }

    #[test]
    fn build_keeps_caller_order_and_fields() {
        let items = vec![item("b", "amy", "second"), item("a", "bob", "first")];
        let built = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let doc = build(&items, &meta(), built);
        assert_eq!(doc.last_build_date, built.to_rfc2822());
        let guids: Vec<_> = doc.items.iter().map(|i| i.guid.as_str()).collect();
        assert_eq!(guids, vec!["b", "a"]);
        assert_eq!(doc.items[0].author, "Some Name (@amy)");
        assert_eq!(doc.items[0].link, "https://x.com/amy/status/b");
        assert_eq!(build(&items, &meta(), built), doc);
    }

    #[test]
    fn xml_round_trip_recovers_ids_titles_links() {
        let items = vec![
            item("10", "amy", "Fish & chips <b>bold</b>"),
            item("11", "bob", "plain post text"),
        ];
        let doc = build(&items, &meta(), Utc::now());
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains(r#"<guid isPermaLink="false">10</guid>"#));
        assert!(xml.contains("<![CDATA["));

        let back = FeedDocument::parse(&xml).unwrap();
        assert_eq!(back.title, "Lists");
        assert_eq!(back.ttl_minutes, 30);
        assert_eq!(back.items.len(), 2);
        for (orig, parsed) in doc.items.iter().zip(back.items.iter()) {
            assert_eq!(parsed.guid, orig.guid);
            assert_eq!(parsed.title, orig.title);
            assert_eq!(parsed.link, orig.link);
            assert_eq!(parsed.category, orig.category);
        }
    }

    #[test]
    fn cdata_terminator_in_body_is_split() {
        let doc = build(&[item("1", "amy", "tricky ]]> text")], &meta(), Utc::now());
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains("tricky ]]]]><![CDATA[> text"));
        assert_eq!(FeedDocument::parse(&xml).unwrap().items.len(), 1);
    }

    #[test]
    fn control_characters_are_stripped() {
        assert_eq!(xml_safe("a\u{0}b\u{8}c\td\n"), "abc\td\n");
    }

    #[test]
    fn empty_feed_renders_and_parses() {
        let doc = build(&[], &meta(), Utc::now());
        let back = FeedDocument::parse(&doc.to_xml().unwrap()).unwrap();
        assert!(back.items.is_empty());
        assert_eq!(back.description, "Aggregated");
    }
}
