//! Token transform infrastructure
//!
//! A transform stage owns a [`TokenTransformManager`] holding an
//! ordered registry of handlers. Tokens are dispatched one at a time
//! through the handlers whose match key applies, in ascending rank
//! order; a handler may pass the token through, replace it with a new
//! sequence, or fail the parse.
//!
//! Handlers run on a single logical thread per parse. They may mutate
//! the registry they are being dispatched through (register or remove
//! other handlers); such mutations take effect starting with the next
//! token, never the one currently in flight.

pub mod manager;
pub mod trace;

pub use manager::{RegistrationHandle, TokenTransformManager};
pub use trace::{TraceSink, VecSink};

use crate::wikitext::token::Token;
use std::fmt;

/// Expansion frame context handed to every handler invocation.
///
/// The pipeline threads the frame through unmodified and never inspects
/// its contents; handlers that cooperate with template expansion read
/// whatever their producer put in it.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    data: serde_json::Value,
}

impl Frame {
    pub fn new(data: serde_json::Value) -> Self {
        Frame { data }
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }
}

/// What a handler did with the token it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformResult {
    /// The token passes through to the next handler unmodified.
    Unchanged(Token),
    /// The token is replaced by zero or more new tokens. Replacements
    /// continue through the handlers ranked after the one that produced
    /// them; earlier-ranked handlers never see them.
    Replaced(Vec<Token>),
}

/// Errors raised while transforming a token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformError {
    /// A list bullet outside the `* # ; :` set.
    UnknownBullet(char),
    /// A handler failed while processing a token. Carries the handler's
    /// debug name and a rendering of the offending token; aborts the
    /// remaining dispatch chain and the parse.
    HandlerFailed {
        handler: String,
        token: String,
        source: Box<TransformError>,
    },
    /// The same `(key, debug name)` pair was registered twice. A setup
    /// bug, not retried.
    DuplicateRegistration { key: String, name: String },
}

impl TransformError {
    /// The innermost error, unwrapping dispatch-level context.
    pub fn root_cause(&self) -> &TransformError {
        match self {
            TransformError::HandlerFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::UnknownBullet(bullet) => {
                write!(f, "Unknown bullet character '{}'", bullet)
            }
            TransformError::HandlerFailed {
                handler,
                token,
                source,
            } => {
                write!(f, "Handler '{}' failed on {:?}: {}", handler, token, source)
            }
            TransformError::DuplicateRegistration { key, name } => {
                write!(f, "Transform '{}' is already registered for {}", name, key)
            }
        }
    }
}

impl std::error::Error for TransformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransformError::HandlerFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// A single stage in the token transform pipeline.
///
/// Implementations own their private state; the manager invokes them
/// through `Rc<RefCell<_>>` so a handler can re-register itself (or
/// others) on the manager it is being dispatched from.
///
/// Wildcard-registered handlers see every token and must check the
/// token kind before acting; tokens they do not care about must be
/// returned as [`TransformResult::Unchanged`].
pub trait TokenTransform {
    fn on_token(
        &mut self,
        token: Token,
        frame: &Frame,
        prev: Option<&Token>,
        manager: &mut TokenTransformManager,
    ) -> Result<TransformResult, TransformError>;
}
