//! Transform registry and dispatch
//!
//! The manager keeps, per match key, an ordered set of registrations
//! and dispatches each token through the merged chain of key-specific
//! and wildcard handlers. The chain is snapshotted before any handler
//! runs, so registry mutations made by a handler apply from the next
//! token onward and never retroactively to tokens mid-dispatch.
//!
//! Each parse constructs its own manager; there is no process-wide
//! registry.

use crate::wikitext::token::{render_tokens, MatchKey, Token};
use crate::wikitext::transform::trace::TraceSink;
use crate::wikitext::transform::{Frame, TokenTransform, TransformError, TransformResult};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

/// Identifies one registration for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationHandle(u64);

#[derive(Clone)]
struct Registration {
    rank: f64,
    /// Registration order; breaks rank ties and doubles as the handle.
    seq: u64,
    debug_name: String,
    handler: Rc<RefCell<dyn TokenTransform>>,
}

impl Registration {
    fn order(&self, other: &Registration) -> Ordering {
        self.rank
            .total_cmp(&other.rank)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Rank-ordered handler registry and dispatcher for one pipeline stage.
pub struct TokenTransformManager {
    transformers: HashMap<MatchKey, Vec<Registration>>,
    next_seq: u64,
    tracer: Option<Box<dyn TraceSink>>,
}

impl TokenTransformManager {
    pub fn new() -> Self {
        TokenTransformManager {
            transformers: HashMap::new(),
            next_seq: 0,
            tracer: None,
        }
    }

    /// Insert a registration into the sorted set for `key`.
    ///
    /// Lower ranks run earlier; equal ranks run in registration order.
    /// Fails with [`TransformError::DuplicateRegistration`] only when
    /// the same `(key, debug_name)` pair is already active;
    /// re-registration under a fresh name is always allowed.
    pub fn register(
        &mut self,
        key: MatchKey,
        rank: f64,
        handler: Rc<RefCell<dyn TokenTransform>>,
        debug_name: &str,
    ) -> Result<RegistrationHandle, TransformError> {
        let regs = self.transformers.entry(key.clone()).or_default();
        if regs.iter().any(|r| r.debug_name == debug_name) {
            return Err(TransformError::DuplicateRegistration {
                key: key.to_string(),
                name: debug_name.to_string(),
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let registration = Registration {
            rank,
            seq,
            debug_name: debug_name.to_string(),
            handler,
        };
        let pos = regs.partition_point(|r| r.rank.total_cmp(&rank).is_le());
        regs.insert(pos, registration);
        log::trace!("registered '{}' on {} at rank {}", debug_name, key, rank);
        Ok(RegistrationHandle(seq))
    }

    /// Remove a registration. A no-op if it was already removed.
    ///
    /// Safe to call from within a handler mid-dispatch; removal takes
    /// effect for the next token, not the one currently in flight.
    pub fn unregister(&mut self, key: &MatchKey, handle: RegistrationHandle) {
        if let Some(regs) = self.transformers.get_mut(key) {
            regs.retain(|r| r.seq != handle.0);
        }
    }

    /// Install the diagnostic trace sink. Disabled by default; tracing
    /// never affects dispatch behavior.
    pub fn set_tracer(&mut self, sink: Box<dyn TraceSink>) {
        self.tracer = Some(sink);
    }

    /// Dispatch one token through the merged chain of handlers
    /// registered for its key and for the wildcard, in rank order.
    ///
    /// A handler replacing the token feeds each replacement to the
    /// handlers ranked after it, never back to the start of the chain.
    pub fn dispatch(
        &mut self,
        token: Token,
        frame: &Frame,
        prev: Option<&Token>,
    ) -> Result<Vec<Token>, TransformError> {
        if matches!(token, Token::EndOfStream) {
            return self.dispatch_end(frame);
        }
        let chain = self.merged_chain(&token.key());
        self.apply_chain(&chain, 0, token, frame, prev)
    }

    /// Dispatch the end-of-stream signal, exactly once at stream close.
    ///
    /// Only `End`-keyed handlers run; they produce their closing and
    /// cleanup sequences, and the end marker flows through to the
    /// output so downstream consumers see the stream terminate.
    pub fn dispatch_end(&mut self, frame: &Frame) -> Result<Vec<Token>, TransformError> {
        let chain = self
            .transformers
            .get(&MatchKey::End)
            .cloned()
            .unwrap_or_default();
        self.apply_chain(&chain, 0, Token::EndOfStream, frame, None)
    }

    /// Key-specific and wildcard registrations, merged by rank then
    /// registration order. Snapshotted per dispatch pass.
    fn merged_chain(&self, key: &MatchKey) -> Vec<Registration> {
        let empty: &[Registration] = &[];
        let specific = self.transformers.get(key).map_or(empty, |v| v.as_slice());
        let any = self
            .transformers
            .get(&MatchKey::Any)
            .map_or(empty, |v| v.as_slice());

        let mut chain = Vec::with_capacity(specific.len() + any.len());
        let (mut i, mut j) = (0, 0);
        while i < specific.len() && j < any.len() {
            if specific[i].order(&any[j]) != Ordering::Greater {
                chain.push(specific[i].clone());
                i += 1;
            } else {
                chain.push(any[j].clone());
                j += 1;
            }
        }
        chain.extend(specific[i..].iter().cloned());
        chain.extend(any[j..].iter().cloned());
        chain
    }

    fn apply_chain(
        &mut self,
        chain: &[Registration],
        start: usize,
        token: Token,
        frame: &Frame,
        prev: Option<&Token>,
    ) -> Result<Vec<Token>, TransformError> {
        let mut current = token;
        for (i, reg) in chain.iter().enumerate().skip(start) {
            let described = current.describe();
            let handler = Rc::clone(&reg.handler);
            let result = handler
                .borrow_mut()
                .on_token(current, frame, prev, self)
                .map_err(|e| TransformError::HandlerFailed {
                    handler: reg.debug_name.clone(),
                    token: described,
                    source: Box::new(e),
                })?;

            match result {
                TransformResult::Unchanged(token) => current = token,
                TransformResult::Replaced(tokens) => {
                    if let Some(tracer) = self.tracer.as_mut() {
                        tracer.trace(&reg.debug_name, &tokens);
                    }
                    log::trace!("{} -> {:?}", reg.debug_name, render_tokens(&tokens));
                    let mut out = Vec::new();
                    for replacement in tokens {
                        out.extend(self.apply_chain(chain, i + 1, replacement, frame, prev)?);
                    }
                    return Ok(out);
                }
            }
        }
        Ok(vec![current])
    }
}

impl Default for TokenTransformManager {
    fn default() -> Self {
        Self::new()
    }
}
