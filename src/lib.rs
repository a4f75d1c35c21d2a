//! # wikitok
//!
//! A token transform pipeline for wiki markup.
//!
//! Lexed wiki tokens enter a rank-ordered set of transform handlers and
//! leave as a structured token stream ready for HTML serialization. The
//! pipeline's densest consumer is the list handler, which rebuilds
//! nested `ul`/`ol`/`dl` structure from flat bullet-prefixed list item
//! tokens.

pub mod wikitext;
