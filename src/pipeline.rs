//! The ordered transformation pipeline. Each stage is a plain function over
//! the whole store: it may read, rewrite, rename, or delete any entry. The
//! order of the stage list is part of the contract, not an implementation
//! detail: every rename stage runs before URL assignment so that URLs are
//! final, and the aggregation and feed stages run after it so they only see
//! finalized keys.
//!
//! Stage preconditions, in declaration order:
//!
//! 1. directory-config: keys still carry config-file suffixes.
//! 2. date-rename: keys still carry file extensions.
//! 3. front-matter: raw `data` untouched by conversion stages.
//! 4. markdown/textile/html conversion: front matter already stripped.
//! 5. json/yaml decode: config keys already removed by stage 1.
//! 6. index-collapse: extensions already stripped, so `/index` is bare.
//! 7. url-assignment: all renames done; keys are final.
//! 8. author-avatars: `meta` fully merged.
//! 9. directory-redirects: keys are final.
//! 10. blog-aggregation: kinds decided by stage 7.
//! 11. feeds: `posts` lists populated by stage 10.

use crate::feed;
use crate::markdown;
use crate::store::{merge_meta, Meta, Page, PageKind, Store};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// The avatar size variants derived for every record carrying an avatar URL.
const AVATAR_SIZES: [u32; 5] = [24, 32, 40, 64, 128];

/// Runs every stage once, in order. The first stage error aborts the run.
pub fn run(store: &mut Store) -> Result<()> {
    const STAGES: &[(&str, fn(&mut Store) -> Result<()>)] = &[
        ("directory-config", directory_config),
        ("date-rename", date_rename),
        ("front-matter", front_matter),
        ("markdown", markdown_pages),
        ("textile", textile_pages),
        ("html", html_pages),
        ("json-meta", json_meta),
        ("yaml-meta", yaml_meta),
        ("index-collapse", index_collapse),
        ("url-assignment", url_assignment),
        ("author-avatars", author_avatars),
        ("directory-redirects", directory_redirects),
        ("blog-aggregation", blog_aggregation),
        ("feeds", feeds),
    ];

    for &(name, stage) in STAGES {
        debug!(stage = name, pages = store.len(), "running stage");
        stage(store)?;
    }
    Ok(())
}

/// Stage 1: merges every `.cfg.json` / `.config.json` record into the `cfg`
/// field of its owning directory's record and deletes the config key.
fn directory_config(store: &mut Store) -> Result<()> {
    for suffix in [".cfg.json", ".config.json"] {
        let keys = matching_keys(store, |k| k.ends_with(suffix));
        for key in keys {
            let page = match store.remove(&key) {
                Some(page) => page,
                None => continue,
            };
            let parsed = parse_json_object(&key, &page.data.unwrap_or_default())?;
            let target = key[..key.len() - suffix.len()].to_owned();
            let dir = store.entry(target).or_default();
            match &mut dir.cfg {
                Some(cfg) => merge_meta(cfg, parsed),
                slot => *slot = Some(parsed),
            }
        }
    }
    Ok(())
}

/// Stage 2: rewrites keys whose final segment is `YYYY-MM-DD-<rest>` to drop
/// the date prefix, recording the date under `meta.date`.
fn date_rename(store: &mut Store) -> Result<()> {
    let keys = matching_keys(store, |_| true);
    for key in keys {
        let (dir, name) = match key.rfind('/') {
            Some(i) => (&key[..i + 1], &key[i + 1..]),
            None => continue,
        };
        if let Some((date, rest)) = split_date_prefix(name) {
            let target = format!("{dir}{rest}");
            if let Some(mut page) = store.remove(&key) {
                page.meta
                    .insert("date".to_owned(), Value::String(date.to_owned()));
                insert_or_absorb(store, target, page);
            }
        }
    }
    Ok(())
}

/// Splits `YYYY-MM-DD-<rest>` into the date and the remainder. The remainder
/// must be non-empty.
fn split_date_prefix(name: &str) -> Option<(&str, &str)> {
    let bytes = name.as_bytes();
    if bytes.len() < 12 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'-' {
        return None;
    }
    const DIGITS: [usize; 8] = [0, 1, 2, 3, 5, 6, 8, 9];
    if !DIGITS.iter().all(|&i| bytes[i].is_ascii_digit()) {
        return None;
    }
    Some((&name[..10], &name[11..]))
}

/// Stage 3: splits a leading `---`-fenced block out of `data`, merging the
/// parsed YAML into `meta` (existing `meta` fields win) and leaving exactly
/// the post-fence remainder in `data`. Both fences must be delimiter lines
/// of exactly `---`, so a thematic break like `----` or a `---` embedded in
/// a YAML value never splits the block. Records without a leading fence
/// line are untouched, so the stage is idempotent on them.
fn front_matter(store: &mut Store) -> Result<()> {
    const FENCE_LINE: &str = "---\n";
    for (key, page) in store.iter_mut() {
        let data = match &page.data {
            Some(data) if data.starts_with(FENCE_LINE) => data,
            _ => continue,
        };
        let (yaml, body) = split_fenced(&data[FENCE_LINE.len()..])
            .ok_or_else(|| Error::UnterminatedFrontMatter { key: key.clone() })?;
        let block = parse_yaml_object(key, yaml)?;
        let body = body.to_owned();
        merge_meta(&mut page.meta, block);
        page.data = Some(body);
    }
    Ok(())
}

/// Splits the text after an opening fence line into the fenced block and
/// the remainder after the closing fence line. The closing fence is a line
/// of exactly `---`, possibly the final line of the input. Returns `None`
/// when no closing fence line exists.
fn split_fenced(rest: &str) -> Option<(&str, &str)> {
    if let Some(body) = rest.strip_prefix("---\n") {
        return Some(("", body));
    }
    if rest == "---" {
        return Some(("", ""));
    }
    if let Some(i) = rest.find("\n---\n") {
        return Some((&rest[..i], &rest[i + "\n---\n".len()..]));
    }
    rest.strip_suffix("\n---").map(|yaml| (yaml, ""))
}

/// Stage 4a: renders `.md` records to HTML.
fn markdown_pages(store: &mut Store) -> Result<()> {
    convert_pages(store, ".md", markdown::to_html)
}

/// Stage 4b: passes `.textile` bodies through unrendered. There is no
/// Textile renderer in the stack; the stage still claims the extension so
/// the body lands in `content` and the key loses its suffix.
fn textile_pages(store: &mut Store) -> Result<()> {
    convert_pages(store, ".textile", str::to_owned)
}

/// Stage 4c: passes `.html` bodies through verbatim.
fn html_pages(store: &mut Store) -> Result<()> {
    convert_pages(store, ".html", str::to_owned)
}

/// Shared body of the format-conversion stages: per matching key, render the
/// remaining `data` into `content`, strip the extension to get the
/// destination key, and delete the source key. When two formats collide on a
/// destination, the later stage wins the `content` slot.
fn convert_pages<F>(store: &mut Store, extension: &str, render: F) -> Result<()>
where
    F: Fn(&str) -> String,
{
    let keys = matching_keys(store, |k| k.ends_with(extension));
    for key in keys {
        let mut page = match store.remove(&key) {
            Some(page) => page,
            None => continue,
        };
        let body = page.data.take().unwrap_or_default();
        let content = render(&body);
        let target = key[..key.len() - extension.len()].to_owned();
        match store.get_mut(&target) {
            Some(existing) => {
                existing.absorb(page);
                existing.content = Some(content);
            }
            None => {
                page.content = Some(content);
                store.insert(target, page);
            }
        }
    }
    Ok(())
}

/// Stage 5a: decodes remaining `.json` records into the stripped key's meta.
fn json_meta(store: &mut Store) -> Result<()> {
    decode_meta(store, ".json", parse_json_object)
}

/// Stage 5b: decodes remaining `.yaml` records into the stripped key's meta.
fn yaml_meta(store: &mut Store) -> Result<()> {
    decode_meta(store, ".yaml", parse_yaml_object)
}

/// Shared body of the structured-metadata stages: parse `data`, merge into
/// the record's own meta (fields the record already carries win), then fold
/// the record into the extension-stripped key and delete the source.
fn decode_meta<F>(store: &mut Store, extension: &str, parse: F) -> Result<()>
where
    F: Fn(&str, &str) -> Result<Meta>,
{
    let keys = matching_keys(store, |k| k.ends_with(extension));
    for key in keys {
        let mut page = match store.remove(&key) {
            Some(page) => page,
            None => continue,
        };
        let parsed = parse(&key, &page.data.take().unwrap_or_default())?;
        merge_meta(&mut page.meta, parsed);
        let target = key[..key.len() - extension.len()].to_owned();
        insert_or_absorb(store, target, page);
    }
    Ok(())
}

/// Stage 6: folds every `<dir>/index` key into `<dir>/`; the target's
/// pre-existing fields win, and the `/index` key is deleted.
fn index_collapse(store: &mut Store) -> Result<()> {
    const SUFFIX: &str = "/index";
    let keys = matching_keys(store, |k| k.ends_with(SUFFIX));
    for key in keys {
        let page = match store.remove(&key) {
            Some(page) => page,
            None => continue,
        };
        let target = key[..key.len() - SUFFIX.len() + 1].to_owned();
        insert_or_absorb(store, target, page);
    }
    Ok(())
}

/// Stage 7: sets `url` and `meta.url` on every record to its (now final)
/// store key, decides the record's [`PageKind`] once, and drops any raw
/// `data` no earlier stage consumed. `data` is transient by contract, so a
/// finalized record never carries it.
fn url_assignment(store: &mut Store) -> Result<()> {
    for (key, page) in store.iter_mut() {
        page.url = key.clone();
        page.meta.insert("url".to_owned(), Value::String(key.clone()));
        page.kind = PageKind::classify(&page.meta);
        page.data = None;
    }
    Ok(())
}

/// Stage 8: derives a deterministic avatar URL from `meta.author.email`
/// (trimmed, lower-cased, hashed), then expands every record carrying an
/// avatar URL with the fixed size variants.
fn author_avatars(store: &mut Store) -> Result<()> {
    for page in store.values_mut() {
        let email = page
            .meta
            .get("author")
            .and_then(|author| author.get("email"))
            .and_then(Value::as_str);
        if let Some(email) = email {
            let digest = blake3::hash(email.trim().to_lowercase().as_bytes());
            let url = format!(
                "https://www.gravatar.com/avatar/{}",
                hex::encode(digest.as_bytes())
            );
            page.meta
                .entry("avatar".to_owned())
                .or_insert(Value::String(url));
        }
    }
    for page in store.values_mut() {
        let avatar = match page.meta.get("avatar").and_then(Value::as_str) {
            Some(avatar) => avatar.to_owned(),
            None => continue,
        };
        for size in AVATAR_SIZES {
            page.meta
                .entry(format!("avatar{size}"))
                .or_insert_with(|| Value::String(format!("{avatar}?s={size}")));
        }
    }
    Ok(())
}

/// Stage 9: for every non-root key ending in `/`, creates (or overwrites) a
/// finalized redirect record at the non-slash key.
fn directory_redirects(store: &mut Store) -> Result<()> {
    let keys = matching_keys(store, |k| k.len() > 1 && k.ends_with('/'));
    for key in keys {
        let bare = key[..key.len() - 1].to_owned();
        store.insert(bare.clone(), Page::redirect(&bare, &key));
    }
    Ok(())
}

/// Stage 10: for every blog record, collects post records that are
/// strict-prefix descendants at the same slash depth, sorts them by
/// `meta.date` descending, stores the keys under `posts`, and duplicates the
/// list under the blog's `archive` sibling. Deeper descendants are excluded
/// so nested collections stay independent.
fn blog_aggregation(store: &mut Store) -> Result<()> {
    fn slash_depth(key: &str) -> usize {
        key.matches('/').count()
    }

    let blogs: Vec<String> = store
        .iter()
        .filter(|(_, page)| page.kind == PageKind::Blog)
        .map(|(key, _)| key.clone())
        .collect();
    for blog_url in blogs {
        let depth = slash_depth(&blog_url);
        let mut dated: Vec<(String, String)> = store
            .iter()
            .filter(|(key, page)| {
                page.kind == PageKind::Post
                    && key.starts_with(&blog_url)
                    && key.len() > blog_url.len()
                    && slash_depth(key) == depth
            })
            .map(|(key, page)| {
                let date = page
                    .meta
                    .get("date")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                (date.to_owned(), key.clone())
            })
            .collect();
        // descending by date; key order breaks ties deterministically
        dated.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        let posts: Vec<String> = dated.into_iter().map(|(_, key)| key).collect();

        if let Some(blog) = store.get_mut(&blog_url) {
            blog.posts = posts.clone();
        }

        let archive_url = format!("{blog_url}archive");
        let archive = store.entry(archive_url.clone()).or_default();
        archive.url = archive_url.clone();
        archive.kind = PageKind::Archive;
        archive.posts = posts;
        archive
            .meta
            .insert("type".to_owned(), Value::String("archive".to_owned()));
        archive
            .meta
            .insert("url".to_owned(), Value::String(archive_url));
    }
    Ok(())
}

/// Stage 11: RSS and Atom synthesis; see [`crate::feed`].
fn feeds(store: &mut Store) -> Result<()> {
    feed::generate(store).map_err(Error::Feed)
}

/// Snapshots the keys satisfying `pred` so a stage can mutate the store
/// while iterating.
fn matching_keys<F>(store: &Store, pred: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    store.keys().filter(|k| pred(k.as_str())).cloned().collect()
}

/// Inserts `page` at `target`, folding it into any record already there
/// (the existing record's fields win).
fn insert_or_absorb(store: &mut Store, target: String, page: Page) {
    match store.get_mut(&target) {
        Some(existing) => existing.absorb(page),
        None => {
            store.insert(target, page);
        }
    }
}

fn parse_json_object(key: &str, data: &str) -> Result<Meta> {
    let value: Value = serde_json::from_str(data).map_err(|err| Error::Json {
        key: key.to_owned(),
        err,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::NotAnObject {
            key: key.to_owned(),
        }),
    }
}

fn parse_yaml_object(key: &str, data: &str) -> Result<Meta> {
    let value: Value = serde_yaml::from_str(data).map_err(|err| Error::Yaml {
        key: key.to_owned(),
        err,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        // an empty block parses to null
        Value::Null => Ok(Meta::new()),
        _ => Err(Error::NotAnObject {
            key: key.to_owned(),
        }),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for pipeline stages. Parse errors are fatal to the whole
/// build and carry the key they came from.
#[derive(Debug)]
pub enum Error {
    /// Returned for malformed JSON in config or metadata records.
    Json { key: String, err: serde_json::Error },

    /// Returned for malformed YAML in front matter or metadata records.
    Yaml { key: String, err: serde_yaml::Error },

    /// Returned when a config/metadata document is valid but not a mapping.
    NotAnObject { key: String },

    /// Returned when a leading front-matter fence has no closing fence.
    UnterminatedFrontMatter { key: String },

    /// Returned for errors during feed generation.
    Feed(crate::feed::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Json { key, err } => write!(f, "Parsing JSON for '{key}': {err}"),
            Error::Yaml { key, err } => write!(f, "Parsing YAML for '{key}': {err}"),
            Error::NotAnObject { key } => {
                write!(f, "Metadata for '{key}' is not a key/value mapping")
            }
            Error::UnterminatedFrontMatter { key } => {
                write!(f, "Front matter for '{key}' is missing its closing `---`")
            }
            Error::Feed(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json { key: _, err } => Some(err),
            Error::Yaml { key: _, err } => Some(err),
            Error::NotAnObject { key: _ } => None,
            Error::UnterminatedFrontMatter { key: _ } => None,
            Error::Feed(err) => Some(err),
        }
    }
}

impl From<crate::feed::Error> for Error {
    /// Converts [`crate::feed::Error`]s into [`Error`]. This allows us to
    /// use the `?` operator in the feed stage.
    fn from(err: crate::feed::Error) -> Error {
        Error::Feed(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn page_with_data(data: &str) -> Page {
        Page {
            data: Some(data.to_owned()),
            ..Page::default()
        }
    }

    fn meta(value: Value) -> Meta {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_directory_config() -> Result<()> {
        let mut store = Store::new();
        store.insert(
            "/blog/.cfg.json".to_owned(),
            page_with_data(r#"{"title": "My Blog"}"#),
        );
        directory_config(&mut store)?;
        assert!(!store.contains_key("/blog/.cfg.json"));
        assert_eq!(
            store["/blog/"].cfg,
            Some(meta(json!({"title": "My Blog"})))
        );
        Ok(())
    }

    #[test]
    fn test_directory_config_root() -> Result<()> {
        let mut store = Store::new();
        store.insert(
            "/.config.json".to_owned(),
            page_with_data(r#"{"domain": "https://example.com"}"#),
        );
        directory_config(&mut store)?;
        assert_eq!(
            store["/"].cfg,
            Some(meta(json!({"domain": "https://example.com"})))
        );
        Ok(())
    }

    #[test]
    fn test_directory_config_bad_json_is_fatal() {
        let mut store = Store::new();
        store.insert("/.cfg.json".to_owned(), page_with_data("{nope"));
        assert!(matches!(
            directory_config(&mut store),
            Err(Error::Json { .. })
        ));
    }

    #[test]
    fn test_date_rename() -> Result<()> {
        let mut store = Store::new();
        store.insert("/blog/2020-01-01-hello.md".to_owned(), page_with_data("hi"));
        store.insert("/blog/not-a-date.md".to_owned(), page_with_data("no"));
        date_rename(&mut store)?;
        assert!(!store.contains_key("/blog/2020-01-01-hello.md"));
        let page = &store["/blog/hello.md"];
        assert_eq!(
            page.meta.get("date").and_then(Value::as_str),
            Some("2020-01-01")
        );
        assert!(store.contains_key("/blog/not-a-date.md"));
        Ok(())
    }

    #[test]
    fn test_split_date_prefix() {
        assert_eq!(
            split_date_prefix("2020-01-01-hello.md"),
            Some(("2020-01-01", "hello.md"))
        );
        assert_eq!(split_date_prefix("2020-01-01-"), None);
        assert_eq!(split_date_prefix("hello.md"), None);
        assert_eq!(split_date_prefix("20x0-01-01-hello.md"), None);
    }

    #[test]
    fn test_front_matter() -> Result<()> {
        let mut store = Store::new();
        store.insert(
            "/post.md".to_owned(),
            page_with_data("---\ntitle: Hello\ntype: post\n---\nbody text"),
        );
        front_matter(&mut store)?;
        let page = &store["/post.md"];
        assert_eq!(page.data.as_deref(), Some("body text"));
        assert_eq!(
            page.meta.get("title").and_then(Value::as_str),
            Some("Hello")
        );
        assert_eq!(page.meta.get("type").and_then(Value::as_str), Some("post"));
        Ok(())
    }

    #[test]
    fn test_front_matter_existing_meta_wins() -> Result<()> {
        let mut store = Store::new();
        let mut page = page_with_data("---\ndate: \"1999-09-09\"\n---\nbody");
        page.meta
            .insert("date".to_owned(), Value::String("2020-01-01".to_owned()));
        store.insert("/post.md".to_owned(), page);
        front_matter(&mut store)?;
        assert_eq!(
            store["/post.md"].meta.get("date").and_then(Value::as_str),
            Some("2020-01-01")
        );
        Ok(())
    }

    #[test]
    fn test_front_matter_no_fence_is_untouched() -> Result<()> {
        let mut store = Store::new();
        store.insert("/plain.md".to_owned(), page_with_data("just a body"));
        front_matter(&mut store)?;
        front_matter(&mut store)?;
        let page = &store["/plain.md"];
        assert_eq!(page.data.as_deref(), Some("just a body"));
        assert!(page.meta.is_empty());
        Ok(())
    }

    #[test]
    fn test_front_matter_unterminated_is_fatal() {
        let mut store = Store::new();
        store.insert("/bad.md".to_owned(), page_with_data("---\ntitle: x\n"));
        assert!(matches!(
            front_matter(&mut store),
            Err(Error::UnterminatedFrontMatter { .. })
        ));
    }

    #[test]
    fn test_front_matter_thematic_break_is_not_a_fence() -> Result<()> {
        let mut store = Store::new();
        store.insert("/rule.md".to_owned(), page_with_data("----\nnot front matter"));
        front_matter(&mut store)?;
        let page = &store["/rule.md"];
        assert_eq!(page.data.as_deref(), Some("----\nnot front matter"));
        assert!(page.meta.is_empty());
        Ok(())
    }

    #[test]
    fn test_front_matter_dashes_inside_value() -> Result<()> {
        let mut store = Store::new();
        store.insert(
            "/post.md".to_owned(),
            page_with_data("---\ntitle: a --- b\n---\nbody"),
        );
        front_matter(&mut store)?;
        let page = &store["/post.md"];
        assert_eq!(
            page.meta.get("title").and_then(Value::as_str),
            Some("a --- b")
        );
        assert_eq!(page.data.as_deref(), Some("body"));
        Ok(())
    }

    #[test]
    fn test_split_fenced() {
        assert_eq!(split_fenced("title: x\n---\nbody"), Some(("title: x", "body")));
        assert_eq!(split_fenced("title: x\n---"), Some(("title: x", "")));
        assert_eq!(split_fenced("---\nbody"), Some(("", "body")));
        assert_eq!(split_fenced("---"), Some(("", "")));
        assert_eq!(split_fenced("title: x\n"), None);
    }

    #[test]
    fn test_markdown_conversion() -> Result<()> {
        let mut store = Store::new();
        store.insert("/hello.md".to_owned(), page_with_data("# Hello"));
        markdown_pages(&mut store)?;
        assert!(!store.contains_key("/hello.md"));
        let page = &store["/hello"];
        assert_eq!(page.content.as_deref(), Some("<h1>Hello</h1>\n"));
        assert_eq!(page.data, None);
        Ok(())
    }

    #[test]
    fn test_textile_passthrough() -> Result<()> {
        let mut store = Store::new();
        store.insert("/note.textile".to_owned(), page_with_data("h1. Note"));
        textile_pages(&mut store)?;
        assert!(!store.contains_key("/note.textile"));
        assert_eq!(store["/note"].content.as_deref(), Some("h1. Note"));
        Ok(())
    }

    #[test]
    fn test_html_passthrough() -> Result<()> {
        let mut store = Store::new();
        store.insert("/raw.html".to_owned(), page_with_data("<b>raw</b>"));
        html_pages(&mut store)?;
        assert_eq!(store["/raw"].content.as_deref(), Some("<b>raw</b>"));
        Ok(())
    }

    #[test]
    fn test_later_format_stage_wins_content() -> Result<()> {
        let mut store = Store::new();
        store.insert("/page.md".to_owned(), page_with_data("md body"));
        store.insert("/page.html".to_owned(), page_with_data("html body"));
        markdown_pages(&mut store)?;
        html_pages(&mut store)?;
        assert_eq!(store["/page"].content.as_deref(), Some("html body"));
        Ok(())
    }

    #[test]
    fn test_json_meta() -> Result<()> {
        let mut store = Store::new();
        store.insert(
            "/about.json".to_owned(),
            page_with_data(r#"{"title": "About"}"#),
        );
        json_meta(&mut store)?;
        assert!(!store.contains_key("/about.json"));
        assert_eq!(
            store["/about"].meta.get("title").and_then(Value::as_str),
            Some("About")
        );
        Ok(())
    }

    #[test]
    fn test_json_meta_merges_into_converted_page() -> Result<()> {
        let mut store = Store::new();
        store.insert("/about.md".to_owned(), page_with_data("body"));
        store.insert(
            "/about.json".to_owned(),
            page_with_data(r#"{"title": "About"}"#),
        );
        markdown_pages(&mut store)?;
        json_meta(&mut store)?;
        let page = &store["/about"];
        assert_eq!(page.content.as_deref(), Some("<p>body</p>\n"));
        assert_eq!(
            page.meta.get("title").and_then(Value::as_str),
            Some("About")
        );
        Ok(())
    }

    #[test]
    fn test_yaml_meta() -> Result<()> {
        let mut store = Store::new();
        store.insert("/team.yaml".to_owned(), page_with_data("lead: anne"));
        yaml_meta(&mut store)?;
        assert_eq!(
            store["/team"].meta.get("lead").and_then(Value::as_str),
            Some("anne")
        );
        Ok(())
    }

    #[test]
    fn test_index_collapse() -> Result<()> {
        let mut store = Store::new();
        store.insert(
            "/blog/".to_owned(),
            Page {
                cfg: Some(meta(json!({"title": "Blog"}))),
                ..Page::default()
            },
        );
        store.insert(
            "/blog/index".to_owned(),
            Page {
                content: Some("<p>welcome</p>\n".to_owned()),
                ..Page::default()
            },
        );
        index_collapse(&mut store)?;
        assert!(!store.contains_key("/blog/index"));
        let page = &store["/blog/"];
        assert_eq!(page.content.as_deref(), Some("<p>welcome</p>\n"));
        assert_eq!(page.cfg, Some(meta(json!({"title": "Blog"}))));
        Ok(())
    }

    #[test]
    fn test_url_assignment() -> Result<()> {
        let mut store = Store::new();
        store.insert("/".to_owned(), Page::default());
        let mut post = Page::default();
        post.meta
            .insert("type".to_owned(), Value::String("post".to_owned()));
        store.insert("/blog/a".to_owned(), post);
        store.insert("/notes.txt".to_owned(), page_with_data("scratch"));
        url_assignment(&mut store)?;
        for (key, page) in &store {
            assert_eq!(&page.url, key);
            assert_eq!(page.meta.get("url").and_then(Value::as_str), Some(&key[..]));
            assert_eq!(page.data, None, "raw data survived finalization of {key}");
        }
        assert_eq!(store["/"].kind, PageKind::Page);
        assert_eq!(store["/blog/a"].kind, PageKind::Post);
        Ok(())
    }

    #[test]
    fn test_author_avatars() -> Result<()> {
        let mut store = Store::new();
        let mut page = Page::default();
        page.meta.insert(
            "author".to_owned(),
            json!({"name": "Anne", "email": "  Anne@Example.COM "}),
        );
        store.insert("/about".to_owned(), page);
        author_avatars(&mut store)?;

        let expected = format!(
            "https://www.gravatar.com/avatar/{}",
            hex::encode(blake3::hash(b"anne@example.com").as_bytes())
        );
        let page = &store["/about"];
        assert_eq!(
            page.meta.get("avatar").and_then(Value::as_str),
            Some(&expected[..])
        );
        assert_eq!(
            page.meta.get("avatar64").and_then(Value::as_str),
            Some(format!("{expected}?s=64").as_str())
        );
        assert!(page.meta.contains_key("avatar24"));
        assert!(page.meta.contains_key("avatar128"));
        Ok(())
    }

    #[test]
    fn test_avatar_sizes_for_manual_avatar() -> Result<()> {
        let mut store = Store::new();
        let mut page = Page::default();
        page.meta.insert(
            "avatar".to_owned(),
            Value::String("https://img.example.com/me.png".to_owned()),
        );
        store.insert("/me".to_owned(), page);
        author_avatars(&mut store)?;
        assert_eq!(
            store["/me"].meta.get("avatar32").and_then(Value::as_str),
            Some("https://img.example.com/me.png?s=32")
        );
        Ok(())
    }

    #[test]
    fn test_directory_redirects() -> Result<()> {
        let mut store = Store::new();
        store.insert("/".to_owned(), Page::default());
        store.insert("/blog/".to_owned(), Page::default());
        directory_redirects(&mut store)?;
        let page = &store["/blog"];
        assert_eq!(page.kind, PageKind::Redirect);
        assert_eq!(page.url, "/blog");
        assert_eq!(page.meta.get("to").and_then(Value::as_str), Some("/blog/"));
        // the root never gets a redirect
        assert!(!store.contains_key(""));
        Ok(())
    }

    #[test]
    fn test_blog_aggregation() -> Result<()> {
        let mut store = Store::new();
        let mut blog = Page::default();
        blog.meta
            .insert("type".to_owned(), Value::String("blog".to_owned()));
        store.insert("/blog/".to_owned(), blog);

        for (key, date) in [
            ("/blog/a", "2020-01-01"),
            ("/blog/b", "2021-06-15"),
            ("/blog/sub/c", "2022-01-01"),
        ] {
            let mut post = Page::default();
            post.meta
                .insert("type".to_owned(), Value::String("post".to_owned()));
            post.meta
                .insert("date".to_owned(), Value::String(date.to_owned()));
            store.insert(key.to_owned(), post);
        }

        url_assignment(&mut store)?;
        blog_aggregation(&mut store)?;

        // same-depth descendants only, sorted by date descending
        assert_eq!(store["/blog/"].posts, vec!["/blog/b", "/blog/a"]);
        let archive = &store["/blog/archive"];
        assert_eq!(archive.kind, PageKind::Archive);
        assert_eq!(archive.posts, vec!["/blog/b", "/blog/a"]);
        assert_eq!(archive.url, "/blog/archive");
        Ok(())
    }

    #[test]
    fn test_full_pipeline_invariants() -> Result<()> {
        let mut store = Store::new();
        store.insert("/".to_owned(), Page::default());
        store.insert(
            "/.cfg.json".to_owned(),
            page_with_data(r#"{"title": "Site", "domain": "https://example.com"}"#),
        );
        store.insert(
            "/blog/".to_owned(),
            Page::default(),
        );
        store.insert("/blog".to_owned(), Page::redirect("/blog", "/blog/"));
        store.insert(
            "/blog/index.md".to_owned(),
            page_with_data("---\ntype: blog\n---\nwelcome"),
        );
        store.insert(
            "/blog/2020-01-01-first.md".to_owned(),
            page_with_data("---\ntype: post\ntitle: First\n---\nhello"),
        );
        run(&mut store)?;

        for (key, page) in &store {
            assert_eq!(&page.url, key, "url invariant violated for {key}");
            assert_eq!(page.meta.get("url").and_then(Value::as_str), Some(&key[..]));
        }
        assert_eq!(store["/blog/"].posts, vec!["/blog/first"]);
        assert_eq!(
            store["/blog/first"].meta.get("date").and_then(Value::as_str),
            Some("2020-01-01")
        );
        assert!(store.contains_key("/blog/rss.xml"));
        assert!(store.contains_key("/blog/atom.xml"));
        assert!(store.contains_key("/blog/archive"));
        Ok(())
    }
}
