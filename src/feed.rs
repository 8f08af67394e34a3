//! Syndication-feed synthesis: for every blog record, an RSS document and an
//! Atom document are generated from the blog's aggregated `posts` list plus
//! the root record's directory config (title, description, domain), and
//! stored as pre-rendered records at `<blogUrl>rss.xml` / `<blogUrl>atom.xml`.

use crate::store::{Meta, Page, PageKind, Store};
use atom_syndication::{ContentBuilder, EntryBuilder, FeedBuilder, LinkBuilder};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use rss::{ChannelBuilder, GuidBuilder, ItemBuilder};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Site-wide fields read from the root record's `cfg`. Missing fields fall
/// back to empty strings rather than failing the build.
struct SiteInfo {
    title: String,
    description: String,
    domain: String,
}

impl SiteInfo {
    fn from_cfg(cfg: &Meta) -> SiteInfo {
        fn field(cfg: &Meta, name: &str) -> String {
            cfg.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        }
        SiteInfo {
            title: field(cfg, "title"),
            description: field(cfg, "description"),
            domain: field(cfg, "domain"),
        }
    }
}

/// One post's worth of feed data, resolved from the store.
struct FeedEntry {
    link: String,
    title: String,
    date: DateTime<FixedOffset>,
    content: Option<String>,
}

/// Generates feeds for every blog record. If the root record carries no
/// directory config there is nothing to name the feeds after, so generation
/// is skipped with a warning rather than crashing the build.
pub fn generate(store: &mut Store) -> Result<()> {
    let blogs: Vec<String> = store
        .iter()
        .filter(|(_, page)| page.kind == PageKind::Blog)
        .map(|(key, _)| key.clone())
        .collect();
    if blogs.is_empty() {
        return Ok(());
    }

    let cfg = match store.get("/").and_then(|root| root.cfg.clone()) {
        Some(cfg) => cfg,
        None => {
            warn!("root record has no directory config; skipping feed generation");
            return Ok(());
        }
    };
    let site = SiteInfo::from_cfg(&cfg);

    for blog_url in blogs {
        let entries = collect_entries(store, &blog_url, &site)?;
        let rss_url = format!("{blog_url}rss.xml");
        let atom_url = format!("{blog_url}atom.xml");
        let rss = rss_document(&site, &blog_url, &entries);
        let atom = atom_document(&site, &blog_url, &entries);
        store.insert(
            rss_url.clone(),
            rendered(rss_url, "application/rss+xml", rss),
        );
        store.insert(
            atom_url.clone(),
            rendered(atom_url, "application/atom+xml", atom),
        );
    }
    Ok(())
}

/// Resolves a blog's `posts` keys against the store. Posts without a date
/// are skipped with a warning; a malformed date is a fatal parse error.
fn collect_entries(store: &Store, blog_url: &str, site: &SiteInfo) -> Result<Vec<FeedEntry>> {
    let posts = match store.get(blog_url) {
        Some(blog) => &blog.posts,
        None => return Ok(Vec::new()),
    };

    let mut entries = Vec::with_capacity(posts.len());
    for key in posts {
        let post = match store.get(key) {
            Some(post) => post,
            None => continue,
        };
        let date = match post.meta.get("date").and_then(Value::as_str) {
            Some(date) => date,
            None => {
                warn!(key = %key, "post has no date; excluded from feed");
                continue;
            }
        };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|err| Error::DateParse {
                key: key.clone(),
                err,
            })?
            .and_time(NaiveTime::MIN)
            .and_utc()
            .fixed_offset();
        let title = post
            .meta
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(key)
            .to_owned();
        entries.push(FeedEntry {
            link: format!("{}{}", site.domain, key),
            title,
            date,
            content: post.content.clone(),
        });
    }
    Ok(entries)
}

fn rss_document(site: &SiteInfo, blog_url: &str, entries: &[FeedEntry]) -> String {
    let items: Vec<rss::Item> = entries
        .iter()
        .map(|entry| {
            ItemBuilder::default()
                .title(entry.title.clone())
                .link(Some(entry.link.clone()))
                .guid(
                    GuidBuilder::default()
                        .permalink(true)
                        .value(entry.link.clone())
                        .build(),
                )
                .description(entry.content.clone())
                .pub_date(entry.date.to_rfc2822())
                .build()
        })
        .collect();

    ChannelBuilder::default()
        .title(site.title.clone())
        .link(format!("{}{}", site.domain, blog_url))
        .description(site.description.clone())
        .items(items)
        .build()
        .to_string()
}

fn atom_document(site: &SiteInfo, blog_url: &str, entries: &[FeedEntry]) -> String {
    let updated = entries
        .iter()
        .map(|entry| entry.date)
        .max()
        .unwrap_or_else(|| Utc::now().fixed_offset());

    let entries: Vec<atom_syndication::Entry> = entries
        .iter()
        .map(|entry| {
            EntryBuilder::default()
                .title(entry.title.clone())
                .id(entry.link.clone())
                .updated(entry.date)
                .published(Some(entry.date))
                .links(vec![LinkBuilder::default()
                    .href(entry.link.clone())
                    .rel("alternate".to_owned())
                    .build()])
                .content(entry.content.as_ref().map(|content| {
                    ContentBuilder::default()
                        .value(Some(content.clone()))
                        .content_type(Some("html".to_owned()))
                        .build()
                }))
                .build()
        })
        .collect();

    FeedBuilder::default()
        .title(site.title.clone())
        .subtitle(atom_syndication::Text::plain(site.description.clone()))
        .id(format!("{}{}", site.domain, blog_url))
        .updated(updated)
        .links(vec![LinkBuilder::default()
            .href(format!("{}{}", site.domain, blog_url))
            .rel("alternate".to_owned())
            .build()])
        .entries(entries)
        .build()
        .to_string()
}

/// Wraps a finished document in a finalized `rendered` record.
fn rendered(url: String, content_type: &str, body: String) -> Page {
    let mut page = Page {
        url: url.clone(),
        kind: PageKind::Rendered,
        content: Some(body),
        ..Page::default()
    };
    page.meta
        .insert("type".to_owned(), Value::String("rendered".to_owned()));
    page.meta.insert(
        "contentType".to_owned(),
        Value::String(content_type.to_owned()),
    );
    page.meta.insert("url".to_owned(), Value::String(url));
    page
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for feed generation.
#[derive(Debug)]
pub enum Error {
    /// Returned when a post's `meta.date` doesn't parse as `YYYY-MM-DD`.
    DateParse {
        key: String,
        err: chrono::ParseError,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DateParse { key, err } => {
                write!(f, "Parsing date for feed entry '{key}': {err}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DateParse { key: _, err } => Some(err),
        }
    }
}
