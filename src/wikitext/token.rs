//! Core token types shared across the transform pipeline and tooling.
//!
//! The pipeline operates on a closed set of token variants. Keeping the
//! set closed means every handler matches exhaustively and a new token
//! kind is a compile error at every match site, not a silently
//! unhandled case at runtime.
//!
//! Tokens are value-like: they move through the pipeline by ownership
//! and are never aliased after a handler replaces them. Each
//! tag-carrying variant also carries an opaque [`SourceData`] side
//! channel that every stage forwards verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single named attribute on a tag token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// An order-preserving attribute list.
///
/// Wiki markup attributes are ordered; serializers must see them in the
/// order the markup produced them, so this is a list rather than a map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Attributes(Vec::new())
    }

    /// Append an attribute, keeping insertion order.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Attribute {
            name: name.into(),
            value: value.into(),
        });
    }

    /// First value registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }
}

/// Opaque per-token side data (source ranges, round-trip information).
///
/// Forwarded verbatim by every stage; the pipeline never inspects it.
/// Producers put whatever JSON they need in here and downstream
/// serializers get it back untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceData(serde_json::Value);

impl SourceData {
    pub fn new(value: serde_json::Value) -> Self {
        SourceData(value)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Atomic unit of the intermediate document representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Token {
    /// Opening tag, e.g. `<ul>`.
    TagStart {
        name: String,
        attrs: Attributes,
        source: SourceData,
    },
    /// Closing tag, e.g. `</ul>`.
    TagEnd { name: String, source: SourceData },
    /// Self-closing tag, e.g. `<br/>`.
    SelfClosing {
        name: String,
        attrs: Attributes,
        source: SourceData,
    },
    /// A wiki list item with its full bullet path from the document
    /// root, outer to inner. Bullets are drawn from `* # ; :`.
    ListItem {
        bullets: Vec<char>,
        source: SourceData,
    },
    /// A line break in the source.
    Newline,
    /// A run of plain text.
    Text(String),
    /// Pass-through control marker; transparent to content handlers.
    Meta { source: SourceData },
    /// Synthetic end marker terminating every stream.
    EndOfStream,
}

impl Token {
    /// The tag name for tag-carrying variants.
    pub fn name(&self) -> Option<&str> {
        match self {
            Token::TagStart { name, .. }
            | Token::TagEnd { name, .. }
            | Token::SelfClosing { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The routing key used to look up transform registrations.
    pub fn key(&self) -> MatchKey {
        match self {
            Token::TagStart { name, .. }
            | Token::TagEnd { name, .. }
            | Token::SelfClosing { name, .. } => MatchKey::tag(name),
            Token::ListItem { .. } => MatchKey::tag("listItem"),
            Token::Newline => MatchKey::tag("newline"),
            Token::Text(_) => MatchKey::tag("text"),
            Token::Meta { .. } => MatchKey::tag("meta"),
            Token::EndOfStream => MatchKey::End,
        }
    }

    /// Compact single-line rendering, used by trace output, error
    /// messages, and test assertions.
    pub fn describe(&self) -> String {
        match self {
            Token::TagStart { name, attrs, .. } => format!("<{}{}>", name, render_attrs(attrs)),
            Token::TagEnd { name, .. } => format!("</{}>", name),
            Token::SelfClosing { name, attrs, .. } => {
                format!("<{}{}/>", name, render_attrs(attrs))
            }
            Token::ListItem { bullets, .. } => {
                format!("<listItem:{}/>", bullets.iter().collect::<String>())
            }
            Token::Newline => "\n".to_string(),
            Token::Text(content) => content.clone(),
            Token::Meta { .. } => "<meta/>".to_string(),
            Token::EndOfStream => "<eof/>".to_string(),
        }
    }
}

fn render_attrs(attrs: &Attributes) -> String {
    let mut out = String::new();
    for attr in attrs.iter() {
        out.push_str(&format!(" {}=\"{}\"", attr.name, attr.value));
    }
    out
}

/// Render a token sequence in the compact form, concatenated in order.
pub fn render_tokens(tokens: &[Token]) -> String {
    tokens.iter().map(Token::describe).collect()
}

/// The criterion by which a token is routed to candidate handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    /// A specific tag name (lowercased).
    Tag(String),
    /// Every token, regardless of kind.
    Any,
    /// The end-of-stream signal, dispatched once at stream close.
    End,
}

impl MatchKey {
    /// Key for a specific tag name. Names are case-insensitive.
    pub fn tag(name: &str) -> MatchKey {
        MatchKey::Tag(name.to_ascii_lowercase())
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKey::Tag(name) => write!(f, "tag:{}", name),
            MatchKey::Any => write!(f, "any"),
            MatchKey::End => write!(f, "end"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_preserve_order() {
        let mut attrs = Attributes::new();
        attrs.push("class", "wiki");
        attrs.push("id", "first");
        attrs.push("class", "shadowed");

        let names: Vec<&str> = attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["class", "id", "class"]);
        assert_eq!(attrs.get("class"), Some("wiki"));
    }

    #[test]
    fn test_key_routing() {
        let tag = Token::TagStart {
            name: "UL".to_string(),
            attrs: Attributes::new(),
            source: SourceData::default(),
        };
        assert_eq!(tag.key(), MatchKey::tag("ul"));

        let item = Token::ListItem {
            bullets: vec!['*'],
            source: SourceData::default(),
        };
        assert_eq!(item.key(), MatchKey::tag("listItem"));

        assert_eq!(Token::Newline.key(), MatchKey::tag("newline"));
        assert_eq!(Token::EndOfStream.key(), MatchKey::End);
    }

    #[test]
    fn test_describe_rendering() {
        let mut attrs = Attributes::new();
        attrs.push("class", "wiki");
        let open = Token::TagStart {
            name: "ul".to_string(),
            attrs,
            source: SourceData::default(),
        };
        assert_eq!(open.describe(), "<ul class=\"wiki\">");

        let item = Token::ListItem {
            bullets: vec!['*', '#'],
            source: SourceData::default(),
        };
        assert_eq!(item.describe(), "<listItem:*#/>");

        let tokens = vec![
            Token::TagStart {
                name: "li".to_string(),
                attrs: Attributes::new(),
                source: SourceData::default(),
            },
            Token::Text("hello".to_string()),
            Token::TagEnd {
                name: "li".to_string(),
                source: SourceData::default(),
            },
        ];
        assert_eq!(render_tokens(&tokens), "<li>hello</li>");
    }

    #[test]
    fn test_token_json_round_trip() {
        let tokens = vec![
            Token::ListItem {
                bullets: vec!['*', ';'],
                source: SourceData::new(serde_json::json!({ "tsr": [0, 2] })),
            },
            Token::Text("term".to_string()),
            Token::Newline,
            Token::EndOfStream,
        ];

        let json = serde_json::to_string(&tokens).expect("serialize");
        let back: Vec<Token> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, tokens);
    }
}
