//! Pipeline driver tying the transform manager to its handlers
//!
//! A [`TokenPipeline`] owns one [`TokenTransformManager`] with the
//! standard handlers attached, threads the expansion frame through
//! every dispatch, and tracks the previous input token for handlers
//! that look one token back. Each parse builds its own pipeline;
//! nothing is shared between parses.
//!
//! [`spawn_stage`] bridges a pipeline across the event loop with a
//! [`QueueDispatcher`], so a producer can hand over token chunks
//! without running in lockstep with the transform stage.

use crate::wikitext::dispatch::{DispatchError, QueueDispatcher};
use crate::wikitext::handlers::ListHandler;
use crate::wikitext::token::Token;
use crate::wikitext::transform::{Frame, TokenTransformManager, TransformError, VecSink};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::mpsc;

/// Ambient configuration for one pipeline instance.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Collect a trace line for every handler replacement.
    pub trace: bool,
}

/// One synchronous transform stage: tokens in, structured tokens out.
pub struct TokenPipeline {
    manager: TokenTransformManager,
    frame: Frame,
    prev: Option<Token>,
    trace: Option<Rc<RefCell<Vec<String>>>>,
}

impl TokenPipeline {
    pub fn new(frame: Frame) -> Result<Self, TransformError> {
        Self::with_config(frame, PipelineConfig::default())
    }

    pub fn with_config(frame: Frame, config: PipelineConfig) -> Result<Self, TransformError> {
        let mut manager = TokenTransformManager::new();
        ListHandler::attach(&mut manager)?;

        let trace = if config.trace {
            let sink = VecSink::new();
            let lines = sink.lines();
            manager.set_tracer(Box::new(sink));
            Some(lines)
        } else {
            None
        };

        Ok(TokenPipeline {
            manager,
            frame,
            prev: None,
            trace,
        })
    }

    /// The manager, for registering additional handlers.
    pub fn manager(&mut self) -> &mut TokenTransformManager {
        &mut self.manager
    }

    /// Feed one token through the stage.
    pub fn process(&mut self, token: Token) -> Result<Vec<Token>, TransformError> {
        if matches!(token, Token::EndOfStream) {
            return self.finish();
        }
        let prev = self.prev.replace(token.clone());
        self.manager.dispatch(token, &self.frame, prev.as_ref())
    }

    /// Close the stream: runs the end-of-stream handlers once, which
    /// produce their pending close sequences.
    pub fn finish(&mut self) -> Result<Vec<Token>, TransformError> {
        self.manager.dispatch_end(&self.frame)
    }

    /// Run a whole token stream through the stage. An explicit
    /// [`Token::EndOfStream`] ends the stream early; otherwise the end
    /// dispatch runs when the input is exhausted.
    pub fn run(
        &mut self,
        tokens: impl IntoIterator<Item = Token>,
    ) -> Result<Vec<Token>, TransformError> {
        let mut out = Vec::new();
        for token in tokens {
            if matches!(token, Token::EndOfStream) {
                out.extend(self.finish()?);
                return Ok(out);
            }
            out.extend(self.process(token)?);
        }
        out.extend(self.finish()?);
        Ok(out)
    }

    /// Trace lines collected so far; empty unless tracing is enabled.
    pub fn trace_lines(&self) -> Vec<String> {
        match &self.trace {
            Some(lines) => lines.borrow().clone(),
            None => Vec::new(),
        }
    }
}

/// Bridge a pipeline across the event loop.
///
/// Chunks enqueued on the returned dispatcher are transformed in
/// order; each chunk's output (or the error that aborted it) arrives
/// on the returned receiver. A [`Token::EndOfStream`] inside a chunk
/// triggers the end dispatch, per the lexer contract that every stream
/// terminates with the explicit end marker.
///
/// Must run inside a `tokio::task::LocalSet`, as the dispatcher's
/// consumption loop is a local task.
#[allow(clippy::type_complexity)]
pub fn spawn_stage(
    mut pipeline: TokenPipeline,
) -> Result<
    (
        QueueDispatcher<Vec<Token>>,
        mpsc::UnboundedReceiver<Result<Vec<Token>, TransformError>>,
    ),
    DispatchError,
> {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let mut dispatcher = QueueDispatcher::new();
    dispatcher.set_handler(move |chunk: Vec<Token>| {
        let mut out = Vec::new();
        let mut failure = None;
        for token in chunk {
            match pipeline.process(token) {
                Ok(tokens) => out.extend(tokens),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        let result = match failure {
            Some(e) => Err(e),
            None => Ok(out),
        };
        if out_tx.send(result).is_err() {
            log::debug!("stage output receiver dropped");
        }
    });
    dispatcher.activate()?;
    Ok((dispatcher, out_rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wikitext::testing::{list_item, text};
    use crate::wikitext::token::render_tokens;

    #[test]
    fn test_run_resolves_nested_list() {
        let mut pipeline = TokenPipeline::new(Frame::default()).expect("pipeline");
        let out = pipeline
            .run(vec![
                list_item("*"),
                text("a"),
                list_item("**"),
                text("b"),
                list_item("*"),
                text("c"),
            ])
            .expect("run");

        assert_eq!(
            render_tokens(&out),
            "<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul><eof/>"
        );
    }

    #[test]
    fn test_explicit_end_of_stream_closes_early() {
        let mut pipeline = TokenPipeline::new(Frame::default()).expect("pipeline");
        let out = pipeline
            .run(vec![
                list_item("*"),
                text("a"),
                Token::EndOfStream,
                text("never reached"),
            ])
            .expect("run");

        assert_eq!(render_tokens(&out), "<ul><li>a</li></ul><eof/>");
    }

    #[test]
    fn test_trace_collects_handler_output() {
        let mut pipeline = TokenPipeline::with_config(
            Frame::default(),
            PipelineConfig { trace: true },
        )
        .expect("pipeline");

        pipeline.run(vec![list_item("*"), text("a")]).expect("run");

        let lines = pipeline.trace_lines();
        assert_eq!(lines[0], "ListHandler: <ul><li>");
        // The end dispatch closed the list.
        assert_eq!(lines[1], "ListHandler: </li></ul><eof/>");
    }

    #[test]
    fn test_plain_stream_passes_through_untouched() {
        let mut pipeline = TokenPipeline::new(Frame::default()).expect("pipeline");
        let out = pipeline
            .run(vec![text("plain"), Token::Newline, text("prose")])
            .expect("run");
        assert_eq!(render_tokens(&out), "plain\nprose<eof/>");
    }

    #[tokio::test]
    async fn test_spawned_stage_transforms_chunks_in_order() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let pipeline = TokenPipeline::new(Frame::default()).expect("pipeline");
                let (mut dispatcher, mut out_rx) = spawn_stage(pipeline).expect("stage");

                dispatcher.enqueue(vec![list_item("*"), text("a")]);
                dispatcher.enqueue(vec![list_item("*"), text("b")]);
                dispatcher.enqueue(vec![Token::EndOfStream]);
                dispatcher.signal_end_of_input();
                dispatcher.join().await;

                let mut rendered = String::new();
                while let Some(result) = out_rx.recv().await {
                    rendered.push_str(&render_tokens(&result.expect("chunk")));
                }
                assert_eq!(rendered, "<ul><li>a</li><li>b</li></ul><eof/>");
            })
            .await;
    }
}
