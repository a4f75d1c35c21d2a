//! Concrete transform handlers
//!
//! Handlers attach themselves to a [`TokenTransformManager`] under the
//! ranks they need relative to the other stages of the pipeline.
//!
//! [`TokenTransformManager`]: crate::wikitext::transform::TokenTransformManager

pub mod list;

pub use list::ListHandler;
