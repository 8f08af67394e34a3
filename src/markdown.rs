//! Markdown rendering with the crate's fixed option set (GFM tables,
//! footnotes, strikethrough, task lists).

use pulldown_cmark::{html, Options, Parser};

/// Renders a markdown body to an HTML string.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut out = String::new();
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}
