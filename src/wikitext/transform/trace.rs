//! Diagnostic trace sink for handler output
//!
//! An optional hook receiving a human-readable rendering of each
//! replacement sequence a handler produces. Disabled by default and
//! never affects dispatch behavior; intended for debugging pipelines
//! and for test assertions over handler activity.

use crate::wikitext::token::{render_tokens, Token};
use std::cell::RefCell;
use std::rc::Rc;

/// Receives one entry per handler replacement during dispatch.
pub trait TraceSink {
    fn trace(&mut self, handler: &str, produced: &[Token]);
}

/// Collects trace lines into a shared buffer.
///
/// The sink itself is handed to the manager; the shared handle from
/// [`VecSink::lines`] stays with the caller for later inspection.
pub struct VecSink {
    lines: Rc<RefCell<Vec<String>>>,
}

impl VecSink {
    pub fn new() -> Self {
        VecSink {
            lines: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Shared handle to the collected lines.
    pub fn lines(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.lines)
    }
}

impl Default for VecSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for VecSink {
    fn trace(&mut self, handler: &str, produced: &[Token]) {
        self.lines
            .borrow_mut()
            .push(format!("{}: {}", handler, render_tokens(produced)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wikitext::testing::{tag_end, tag_start};

    #[test]
    fn test_vec_sink_renders_sequences() {
        let mut sink = VecSink::new();
        let lines = sink.lines();

        sink.trace("ListHandler", &[tag_start("ul"), tag_start("li")]);
        sink.trace("ListHandler", &[tag_end("li"), tag_end("ul")]);

        assert_eq!(
            lines.borrow().as_slice(),
            ["ListHandler: <ul><li>", "ListHandler: </li></ul>"]
        );
    }
}
