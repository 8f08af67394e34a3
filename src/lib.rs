//! The library code for the `pagemill` site builder. A build turns a
//! directory tree of content files into an in-memory map from canonical URL
//! to a fully-resolved page record, ready to be handed to a render layer.
//! The architecture breaks down into three steps:
//!
//! 1. Walking the content directory and loading raw file data into the
//!    shared store ([`crate::walk`])
//! 2. Running the ordered transformation pipeline over the store
//!    ([`crate::pipeline`]): front-matter extraction, format conversion,
//!    metadata decoding, URL canonicalization, blog aggregation, and feed
//!    generation ([`crate::feed`])
//! 3. Handing the finalized store back to the caller ([`crate::build`])
//!
//! Of the three, the second is the interesting one: stage order and the
//! key-rewriting each stage performs determine correctness, so the order is
//! documented and fixed in [`crate::pipeline`]. Serving the finished map
//! over HTTP and rendering templates are deliberately out of scope; callers
//! dispatch on [`crate::store::PageKind`] themselves.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod feed;
pub mod markdown;
pub mod pipeline;
pub mod store;
pub mod walk;
