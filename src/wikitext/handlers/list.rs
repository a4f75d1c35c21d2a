//! List reconstruction handler
//!
//! Creates list containers around list items and maps wiki bullet
//! levels to HTML. Each incoming list item token carries its full
//! bullet path from the document root; the handler diffs that path
//! against the currently open nesting and emits the matching close and
//! open tag tokens.
//!
//! While a list is open the handler also watches every token through a
//! wildcard registration: a second consecutive newline, or any
//! list-less content after a newline, closes the whole list. The
//! watcher is registered on entering a list and removed again when the
//! list closes, so an idle handler costs nothing on non-list streams.

use crate::wikitext::token::{Attributes, MatchKey, SourceData, Token};
use crate::wikitext::transform::{
    Frame, RegistrationHandle, TokenTransform, TokenTransformManager, TransformError,
    TransformResult,
};
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Rank of the list item handler within the stage; before the
/// paragraph wrap handler.
const LIST_RANK: f64 = 2.49;
/// Rank of the wildcard watcher, just after the list item handler.
const ANY_RANK: f64 = 2.491;

/// Container and item element names for one bullet character.
struct BulletMapping {
    container: &'static str,
    item: &'static str,
}

static BULLET_MAP: Lazy<HashMap<char, BulletMapping>> = Lazy::new(|| {
    HashMap::from([
        (
            '*',
            BulletMapping {
                container: "ul",
                item: "li",
            },
        ),
        (
            '#',
            BulletMapping {
                container: "ol",
                item: "li",
            },
        ),
        (
            ';',
            BulletMapping {
                container: "dl",
                item: "dt",
            },
        ),
        (
            ':',
            BulletMapping {
                container: "dl",
                item: "dd",
            },
        ),
    ])
});

fn bullet_mapping(bullet: char) -> Result<&'static BulletMapping, TransformError> {
    BULLET_MAP
        .get(&bullet)
        .ok_or(TransformError::UnknownBullet(bullet))
}

/// A term/definition pair at the same depth swaps the item type inside
/// the shared `dl` instead of closing and reopening the container.
fn is_dt_dd(a: char, b: char) -> bool {
    matches!((a, b), (';', ':') | (':', ';'))
}

fn common_prefix_length(x: &[char], y: &[char]) -> usize {
    x.iter().zip(y).take_while(|(a, b)| a == b).count()
}

/// Stateful consumer turning flat list item tokens into nested
/// list/item open and close sequences.
pub struct ListHandler {
    /// Currently open nesting path, outer to inner. Empty means no
    /// list is open.
    bstack: Vec<char>,
    /// Pending close tokens, two per open level with the item close on
    /// top of its container close.
    endtags: Vec<Token>,
    /// A newline was seen with no list item since; the next list-less
    /// token ends the list block.
    newline: bool,
    /// Wildcard watcher registration while a list is open.
    any_handle: Option<RegistrationHandle>,
    /// Self-reference for registering the watcher mid-dispatch.
    weak: Weak<RefCell<ListHandler>>,
}

impl ListHandler {
    /// Construct a handler and register it on `manager` for list item
    /// tokens and the end-of-stream signal.
    pub fn attach(
        manager: &mut TokenTransformManager,
    ) -> Result<Rc<RefCell<ListHandler>>, TransformError> {
        let handler = Rc::new(RefCell::new(ListHandler {
            bstack: Vec::new(),
            endtags: Vec::new(),
            newline: false,
            any_handle: None,
            weak: Weak::new(),
        }));
        handler.borrow_mut().weak = Rc::downgrade(&handler);

        manager.register(
            MatchKey::tag("listItem"),
            LIST_RANK,
            Rc::clone(&handler) as Rc<RefCell<dyn TokenTransform>>,
            "ListHandler",
        )?;
        manager.register(
            MatchKey::End,
            LIST_RANK,
            Rc::clone(&handler) as Rc<RefCell<dyn TokenTransform>>,
            "ListHandler",
        )?;
        Ok(handler)
    }

    /// Depth of the currently open nesting.
    pub fn open_depth(&self) -> usize {
        self.bstack.len()
    }

    fn reset(&mut self) {
        self.newline = false;
        self.bstack.clear();
        self.endtags.clear();
    }

    /// Open one container+item level, pushing their close tokens onto
    /// the pending stack.
    fn push_list(&mut self, mapping: &BulletMapping) -> Vec<Token> {
        self.endtags.push(Token::TagEnd {
            name: mapping.container.to_string(),
            source: SourceData::default(),
        });
        self.endtags.push(Token::TagEnd {
            name: mapping.item.to_string(),
            source: SourceData::default(),
        });
        vec![
            Token::TagStart {
                name: mapping.container.to_string(),
                attrs: Attributes::new(),
                source: SourceData::default(),
            },
            Token::TagStart {
                name: mapping.item.to_string(),
                attrs: Attributes::new(),
                source: SourceData::default(),
            },
        ]
    }

    /// Pop `n` (item close, container close) pairs, deepest first.
    fn pop_tags(&mut self, n: usize) -> Vec<Token> {
        let mut tokens = Vec::new();
        for _ in 0..n {
            if let Some(item) = self.endtags.pop() {
                tokens.push(item);
            }
            if let Some(container) = self.endtags.pop() {
                tokens.push(container);
            }
        }
        tokens
    }

    /// Close every open level, reset, and remove the wildcard watcher.
    fn close_all(&mut self, manager: &mut TokenTransformManager) -> Vec<Token> {
        let tokens = self.pop_tags(self.bstack.len());
        self.reset();
        if let Some(handle) = self.any_handle.take() {
            manager.unregister(&MatchKey::Any, handle);
        }
        tokens
    }

    fn on_list_item(
        &mut self,
        bullets: Vec<char>,
        source: SourceData,
        manager: &mut TokenTransformManager,
    ) -> Result<TransformResult, TransformError> {
        // Reject the whole path before touching any state, so an
        // unknown bullet emits nothing.
        for &bullet in &bullets {
            bullet_mapping(bullet)?;
        }

        self.newline = false;
        if self.bstack.is_empty() {
            // First item of a new list: watch every token for the
            // blank line or list-less line that terminates it. The
            // dispatch chain holds a strong reference while this
            // handler runs, so the upgrade succeeds.
            if let Some(me) = self.weak.upgrade() {
                self.any_handle = Some(manager.register(
                    MatchKey::Any,
                    ANY_RANK,
                    me as Rc<RefCell<dyn TokenTransform>>,
                    "ListHandler:onAny",
                )?);
            }
        }

        let old = std::mem::replace(&mut self.bstack, bullets.clone());
        let tokens = self.do_list_item(&old, &bullets, &source)?;
        Ok(TransformResult::Replaced(tokens))
    }

    /// Diff the old and new bullet paths and emit the close/open
    /// sequence between them. Outer levels open before inner ones;
    /// closes come inner before outer.
    fn do_list_item(
        &mut self,
        old: &[char],
        new: &[char],
        source: &SourceData,
    ) -> Result<Vec<Token>, TransformError> {
        let mut prefix_len = common_prefix_length(old, new);
        let change_len = old.len().max(new.len()) - prefix_len;

        if change_len == 0 {
            // Next item at the same nesting: close and reopen only the
            // innermost item.
            if let Some(item_end) = self.endtags.pop() {
                let name = item_end.name().unwrap_or_default().to_string();
                self.endtags.push(Token::TagEnd {
                    name: name.clone(),
                    source: SourceData::default(),
                });
                return Ok(vec![
                    item_end,
                    Token::TagStart {
                        name,
                        attrs: Attributes::new(),
                        source: source.clone(),
                    },
                ]);
            }
            return Ok(Vec::new());
        }

        let mut tokens = Vec::new();
        if old.len() > prefix_len
            && new.len() > prefix_len
            && is_dt_dd(old[prefix_len], new[prefix_len])
        {
            // dt/dd transition at the divergence point: close anything
            // deeper, then swap the item type without closing the
            // shared dl.
            tokens = self.pop_tags(old.len() - prefix_len - 1);
            let new_name = bullet_mapping(new[prefix_len])?.item;
            if let Some(item_end) = self.endtags.pop() {
                tokens.push(item_end);
            }
            self.endtags.push(Token::TagEnd {
                name: new_name.to_string(),
                source: SourceData::default(),
            });
            tokens.push(Token::TagStart {
                name: new_name.to_string(),
                attrs: Attributes::new(),
                source: source.clone(),
            });
            prefix_len += 1;
        } else {
            tokens.extend(self.pop_tags(old.len() - prefix_len));
            if prefix_len > 0 && new.len() == prefix_len {
                // Stopping exactly at an already-open level: reissue
                // that level's item.
                if let Some(item_end) = self.endtags.pop() {
                    let name = item_end.name().unwrap_or_default().to_string();
                    tokens.push(item_end);
                    tokens.push(Token::TagStart {
                        name: name.clone(),
                        attrs: Attributes::new(),
                        source: source.clone(),
                    });
                    self.endtags.push(Token::TagEnd {
                        name,
                        source: SourceData::default(),
                    });
                }
            }
        }

        for &bullet in &new[prefix_len..] {
            let mapping = bullet_mapping(bullet)?;
            tokens.extend(self.push_list(mapping));
        }
        Ok(tokens)
    }

    /// Wildcard watcher, active only while a list is open.
    fn on_any(
        &mut self,
        token: Token,
        manager: &mut TokenTransformManager,
    ) -> Result<TransformResult, TransformError> {
        match token {
            Token::Newline => {
                if self.newline {
                    // Second newline without a list item in between:
                    // close the list.
                    let mut tokens = self.close_all(manager);
                    tokens.push(Token::Newline);
                    Ok(TransformResult::Replaced(tokens))
                } else {
                    self.newline = true;
                    Ok(TransformResult::Unchanged(Token::Newline))
                }
            }
            Token::Meta { .. } => Ok(TransformResult::Unchanged(token)),
            other => {
                if self.newline {
                    // A list-less line terminates the list block.
                    let mut tokens = self.close_all(manager);
                    tokens.push(other);
                    Ok(TransformResult::Replaced(tokens))
                } else {
                    Ok(TransformResult::Unchanged(other))
                }
            }
        }
    }
}

impl TokenTransform for ListHandler {
    fn on_token(
        &mut self,
        token: Token,
        _frame: &Frame,
        _prev: Option<&Token>,
        manager: &mut TokenTransformManager,
    ) -> Result<TransformResult, TransformError> {
        match token {
            Token::ListItem { bullets, source } => self.on_list_item(bullets, source, manager),
            Token::EndOfStream => {
                let mut tokens = self.close_all(manager);
                tokens.push(Token::EndOfStream);
                Ok(TransformResult::Replaced(tokens))
            }
            other => self.on_any(other, manager),
        }
    }
}
