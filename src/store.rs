//! Defines the [`Page`] record, the [`PageKind`] classification, and the
//! [`Store`] map that the walker and pipeline stages operate on. The store is
//! a single-owner arena: the builder creates it empty, passes it `&mut` to
//! the walker and to each pipeline stage in turn, and returns it by value
//! once the pipeline finishes, at which point no further mutation occurs.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Unordered key/value metadata attached to a page. Accumulated across
/// stages via [`merge_meta`].
pub type Meta = serde_json::Map<String, Value>;

/// The shared page map, keyed by canonical URL (always starting with `/`).
/// `BTreeMap` keeps iteration order deterministic, which matters because
/// pipeline stages scan the whole map and rewrite keys as they go.
pub type Store = BTreeMap<String, Page>;

/// The rendering class of a finalized page, decided once during URL
/// assignment from `meta.type`. A render layer dispatches on this
/// exhaustively instead of chaining string comparisons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// An ordinary content page (`meta.type` absent).
    #[default]
    Page,

    /// A dated entry collected by blog aggregation.
    Post,

    /// An aggregator page carrying a sorted `posts` list.
    Blog,

    /// The `/archive` sibling of a blog, sharing its `posts` list.
    Archive,

    /// A page whose only purpose is pointing at another URL (`meta.to`).
    Redirect,

    /// A pre-rendered document (`meta.contentType` + literal `content`).
    Rendered,

    /// Any other application-defined `meta.type`; the render layer resolves
    /// it against a template of that name.
    Other,
}

impl PageKind {
    /// Decides the kind for a record from its `meta.type` field. An absent
    /// type defaults to a plain page.
    pub fn classify(meta: &Meta) -> PageKind {
        match meta.get("type").and_then(Value::as_str) {
            None => PageKind::Page,
            Some("post") => PageKind::Post,
            Some("blog") => PageKind::Blog,
            Some("archive") => PageKind::Archive,
            Some("redirect") => PageKind::Redirect,
            Some("rendered") => PageKind::Rendered,
            Some(_) => PageKind::Other,
        }
    }
}

/// One record in the store.
///
/// Lifecycle: created empty by the walker, populated with raw `data` by the
/// loader, transformed/renamed/merged by pipeline stages, terminal once the
/// pipeline finishes. After the pipeline, `url` equals the record's store
/// key for every record, and `data` is absent from every record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Page {
    /// The record's own canonical URL; set during URL assignment, or at
    /// creation for records generated after it (redirects, archives, feeds).
    pub url: String,

    /// Raw file text. Transient: conversion and decode stages consume it,
    /// and URL assignment clears whatever is left.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Rendered body. Set by exactly one format-conversion stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Accumulated metadata (date, type, title, author, ...).
    #[serde(skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,

    /// Directory-level configuration; only on directory-root records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg: Option<Meta>,

    /// Sorted post keys; only on blog and archive records.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub posts: Vec<String>,

    /// Rendering class; see [`PageKind::classify`].
    pub kind: PageKind,
}

impl Page {
    /// Builds a redirect record from `from` to `to`. Used by the walker when
    /// it discovers a directory and by the redirect-canonicalization stage.
    pub fn redirect(from: &str, to: &str) -> Page {
        let mut page = Page {
            url: from.to_owned(),
            kind: PageKind::Redirect,
            ..Page::default()
        };
        page.meta
            .insert("type".to_owned(), Value::String("redirect".to_owned()));
        page.meta
            .insert("to".to_owned(), Value::String(to.to_owned()));
        page.meta
            .insert("url".to_owned(), Value::String(from.to_owned()));
        page
    }

    /// Merges `other` into `self` when two keys collapse into one (date
    /// renames, extension stripping, `/index` collapse). `self` is the
    /// surviving record: its pre-existing fields win.
    pub fn absorb(&mut self, other: Page) {
        if self.data.is_none() {
            self.data = other.data;
        }
        if self.content.is_none() {
            self.content = other.content;
        }
        merge_meta(&mut self.meta, other.meta);
        match (&mut self.cfg, other.cfg) {
            (Some(cfg), Some(incoming)) => merge_meta(cfg, incoming),
            (slot @ None, incoming) => *slot = incoming,
            _ => {}
        }
        if self.posts.is_empty() {
            self.posts = other.posts;
        }
    }
}

/// The one merge function every merging stage uses: shallow, and keys
/// already present in `dst` win. Stages that need overwrite semantics say
/// so by calling `insert` directly.
pub fn merge_meta(dst: &mut Meta, src: Meta) {
    for (key, value) in src {
        dst.entry(key).or_insert(value);
    }
}
