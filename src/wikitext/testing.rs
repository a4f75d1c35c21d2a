//! Token factories shared by unit and integration tests
//!
//! Building tokens inline is noisy because every tag variant carries
//! attributes and source data; these helpers keep test input readable.

use crate::wikitext::token::{Attributes, SourceData, Token};

pub fn tag_start(name: &str) -> Token {
    Token::TagStart {
        name: name.to_string(),
        attrs: Attributes::new(),
        source: SourceData::default(),
    }
}

pub fn tag_end(name: &str) -> Token {
    Token::TagEnd {
        name: name.to_string(),
        source: SourceData::default(),
    }
}

pub fn self_closing(name: &str) -> Token {
    Token::SelfClosing {
        name: name.to_string(),
        attrs: Attributes::new(),
        source: SourceData::default(),
    }
}

/// A list item token with its bullet path given as a string, e.g.
/// `list_item("*#")` for an ordered list nested in an unordered one.
pub fn list_item(bullets: &str) -> Token {
    Token::ListItem {
        bullets: bullets.chars().collect(),
        source: SourceData::default(),
    }
}

pub fn text(content: &str) -> Token {
    Token::Text(content.to_string())
}

pub fn meta() -> Token {
    Token::Meta {
        source: SourceData::default(),
    }
}
