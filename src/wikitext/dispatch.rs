//! Asynchronous queue dispatcher between pipeline stages
//!
//! Buffers chunks between a producer and a single consumption loop so
//! that stages need not run in lockstep. The loop is cooperative and
//! event-loop-driven: it is spawned as a local task on the current
//! tokio runtime and suspends on an empty queue instead of blocking a
//! thread, which keeps the whole pipeline on one logical thread of
//! control.
//!
//! End of input is the channel closing, not a sentinel value: once
//! [`QueueDispatcher::signal_end_of_input`] runs, the loop drains what
//! is queued and terminates. Cancellation is immediate and lossy;
//! buffered, undelivered chunks are discarded, and anything that must
//! survive cancellation has to be flushed by the caller beforehand.
//!
//! Because the loop is a local task, activation must happen inside a
//! [`tokio::task::LocalSet`] (or a current-thread runtime driving one).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Errors raised while setting up a dispatcher. The running loop
/// itself has no error states; failures inside the per-chunk handler
/// are the owning stage's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// `activate` was called before a handler was installed.
    HandlerMissing,
    /// `activate` was called twice.
    AlreadyActive,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::HandlerMissing => {
                write!(f, "Queue dispatcher activated without a handler")
            }
            DispatchError::AlreadyActive => write!(f, "Queue dispatcher is already active"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// FIFO bridge between an asynchronous producer and a consumption loop.
///
/// Constructed idle; chunks enqueued before activation are buffered
/// and delivered in order once the loop starts.
pub struct QueueDispatcher<C> {
    tx: Option<mpsc::UnboundedSender<C>>,
    rx: Option<mpsc::UnboundedReceiver<C>>,
    handler: Option<Box<dyn FnMut(C)>>,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl<C: 'static> QueueDispatcher<C> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        QueueDispatcher {
            tx: Some(tx),
            rx: Some(rx),
            handler: None,
            active: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Install the callback invoked once per dequeued chunk, in
    /// enqueue order. Must run before [`QueueDispatcher::activate`].
    pub fn set_handler(&mut self, handler: impl FnMut(C) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Spawn the consumption loop on the current local task set.
    ///
    /// The loop repeatedly dequeues the head chunk and invokes the
    /// handler; on an empty queue it suspends until a chunk arrives or
    /// end of input is signaled, and once the queue is empty after end
    /// of input it terminates and the dispatcher goes inactive.
    pub fn activate(&mut self) -> Result<(), DispatchError> {
        if self.task.is_some() || self.rx.is_none() {
            return Err(DispatchError::AlreadyActive);
        }
        let mut handler = self.handler.take().ok_or(DispatchError::HandlerMissing)?;
        let mut rx = self.rx.take().ok_or(DispatchError::AlreadyActive)?;

        self.active.store(true, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        self.task = Some(tokio::task::spawn_local(async move {
            while let Some(chunk) = rx.recv().await {
                handler(chunk);
            }
            // Channel closed and drained: end of input.
            active.store(false, Ordering::SeqCst);
        }));
        Ok(())
    }

    /// Append a chunk to the tail, waking the loop if it is suspended.
    ///
    /// After end of input or cancellation the chunk is dropped.
    pub fn enqueue(&self, chunk: C) {
        match &self.tx {
            Some(tx) => {
                if tx.send(chunk).is_err() {
                    log::debug!("queue dispatcher cancelled; chunk dropped");
                }
            }
            None => log::debug!("enqueue after end of input; chunk dropped"),
        }
    }

    /// Mark that no further chunks will arrive. The loop drains the
    /// remaining queued chunks, then terminates.
    pub fn signal_end_of_input(&mut self) {
        self.tx = None;
    }

    /// Stop the loop before its next dequeue. Already-queued,
    /// undelivered chunks are discarded.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.tx = None;
        self.active.store(false, Ordering::SeqCst);
    }

    /// Whether the consumption loop is currently running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for the loop to finish draining after end of input.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<C: 'static> Default for QueueDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::task::LocalSet;

    fn collecting_dispatcher() -> (QueueDispatcher<u32>, Rc<RefCell<Vec<u32>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut dispatcher = QueueDispatcher::new();
        dispatcher.set_handler(move |chunk| sink.borrow_mut().push(chunk));
        (dispatcher, seen)
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        LocalSet::new()
            .run_until(async {
                let (mut dispatcher, seen) = collecting_dispatcher();
                dispatcher.activate().expect("activate");

                dispatcher.enqueue(1);
                dispatcher.enqueue(2);
                dispatcher.enqueue(3);
                dispatcher.signal_end_of_input();
                dispatcher.join().await;

                assert_eq!(*seen.borrow(), vec![1, 2, 3]);
                assert!(!dispatcher.is_active());
            })
            .await;
    }

    #[tokio::test]
    async fn test_chunks_buffered_before_activation() {
        LocalSet::new()
            .run_until(async {
                let (mut dispatcher, seen) = collecting_dispatcher();

                // Constructed idle: nothing is delivered yet.
                dispatcher.enqueue(10);
                dispatcher.enqueue(20);
                assert!(!dispatcher.is_active());
                assert!(seen.borrow().is_empty());

                dispatcher.activate().expect("activate");
                dispatcher.signal_end_of_input();
                dispatcher.join().await;

                assert_eq!(*seen.borrow(), vec![10, 20]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_fifo_across_idle_resume_cycles() {
        LocalSet::new()
            .run_until(async {
                let (mut dispatcher, seen) = collecting_dispatcher();
                dispatcher.activate().expect("activate");

                dispatcher.enqueue(1);
                tokio::task::yield_now().await;
                // The loop is now suspended on an empty queue.
                assert!(dispatcher.is_active());

                dispatcher.enqueue(2);
                tokio::task::yield_now().await;
                dispatcher.enqueue(3);
                dispatcher.signal_end_of_input();
                dispatcher.join().await;

                assert_eq!(*seen.borrow(), vec![1, 2, 3]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_cancellation_discards_buffered_chunks() {
        LocalSet::new()
            .run_until(async {
                let (mut dispatcher, seen) = collecting_dispatcher();
                dispatcher.activate().expect("activate");

                dispatcher.enqueue(1);
                tokio::task::yield_now().await;

                dispatcher.enqueue(2);
                dispatcher.enqueue(3);
                // Cancel before the loop gets a chance to dequeue.
                dispatcher.cancel();
                tokio::task::yield_now().await;

                assert_eq!(*seen.borrow(), vec![1]);
                assert!(!dispatcher.is_active());

                // Enqueue after cancellation drops silently.
                dispatcher.enqueue(4);
                assert_eq!(*seen.borrow(), vec![1]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_activate_requires_handler() {
        LocalSet::new()
            .run_until(async {
                let mut dispatcher: QueueDispatcher<u32> = QueueDispatcher::new();
                assert_eq!(
                    dispatcher.activate().expect_err("no handler"),
                    DispatchError::HandlerMissing
                );

                dispatcher.set_handler(|_chunk| {});
                dispatcher.activate().expect("activate");
                assert_eq!(
                    dispatcher.activate().expect_err("double activate"),
                    DispatchError::AlreadyActive
                );
                dispatcher.cancel();
            })
            .await;
    }
}
