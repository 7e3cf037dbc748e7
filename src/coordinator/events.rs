// src/coordinator/events.rs
//! Delegate callbacks and event subscriptions
//!
//! Everything a session reports goes through one dispatcher thread per
//! session, in emission order. The registered [`MinerDelegate`] is called
//! first, then every subscriber channel receives a copy of the
//! [`MiningEvent`]. Callbacks never run on the thread that called
//! `start()`/`stop()`, and calling `stop()` from a callback is fine.

use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle, ThreadId};

/// Receives mining notifications
///
/// All methods have empty defaults so implementations only override what
/// they care about. Called from the session's dispatcher thread.
pub trait MinerDelegate: Send + Sync {
    /// A share was accepted; `count` is the worker's total for this session
    fn accepted_result(&self, _count: u64, _worker_id: &str) {}

    /// The pool changed the worker's share difficulty
    fn difficulty_changed(&self, _difficulty: u64, _worker_id: &str) {}

    /// The worker's pool found a block
    fn block_found(&self, _worker_id: &str) {}

    /// Something went wrong; `stopped` tells whether the worker gave up
    fn mining_error(&self, _error: &MinerError, _stopped: bool) {}
}

/// Event delivered to subscribers
#[derive(Debug, Clone)]
pub enum MiningEvent {
    /// See [`MinerDelegate::accepted_result`]
    AcceptedResult {
        /// Accepted shares of this worker in the session
        count: u64,
        /// Worker identifier
        worker_id: String,
    },
    /// See [`MinerDelegate::difficulty_changed`]
    DifficultyChanged {
        /// New share difficulty
        difficulty: u64,
        /// Worker identifier
        worker_id: String,
    },
    /// See [`MinerDelegate::block_found`]
    BlockFound {
        /// Worker identifier
        worker_id: String,
    },
    /// See [`MinerDelegate::mining_error`]
    MiningError {
        /// Worker the error belongs to
        worker_id: String,
        /// What happened
        error: Arc<MinerError>,
        /// The worker stopped for the rest of the session
        stopped: bool,
    },
}

impl MiningEvent {
    /// Worker the event belongs to
    pub fn worker_id(&self) -> &str {
        match self {
            MiningEvent::AcceptedResult { worker_id, .. }
            | MiningEvent::DifficultyChanged { worker_id, .. }
            | MiningEvent::BlockFound { worker_id }
            | MiningEvent::MiningError { worker_id, .. } => worker_id,
        }
    }
}

/// Delegate and subscribers; outlives sessions
#[derive(Default)]
pub struct EventBus {
    delegate: RwLock<Option<Arc<dyn MinerDelegate>>>,
    subscribers: Mutex<Vec<Sender<MiningEvent>>>,
}

impl EventBus {
    /// Replaces the delegate (`None` removes it)
    pub fn set_delegate(&self, delegate: Option<Arc<dyn MinerDelegate>>) {
        match self.delegate.write() {
            Ok(mut slot) => *slot = delegate,
            Err(poisoned) => *poisoned.into_inner() = delegate,
        }
    }

    /// New unbounded subscription; dropped receivers are pruned on delivery
    pub fn subscribe(&self) -> Receiver<MiningEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    fn deliver(&self, event: &MiningEvent) {
        let delegate = self
            .delegate
            .read()
            .ok()
            .and_then(|delegate| delegate.clone());

        if let Some(delegate) = delegate {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event {
                MiningEvent::AcceptedResult { count, worker_id } => {
                    delegate.accepted_result(*count, worker_id)
                }
                MiningEvent::DifficultyChanged {
                    difficulty,
                    worker_id,
                } => delegate.difficulty_changed(*difficulty, worker_id),
                MiningEvent::BlockFound { worker_id } => delegate.block_found(worker_id),
                MiningEvent::MiningError { error, stopped, .. } => {
                    delegate.mining_error(error, *stopped)
                }
            }));
            if outcome.is_err() {
                log::error!("Delegate panicked while handling {:?}", event);
            }
        }

        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

enum Dispatch {
    Event(MiningEvent),
    Close,
}

/// Cloneable handle session components emit events through
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<Dispatch>,
}

impl EventSink {
    /// Queues an event; never blocks
    pub fn emit(&self, event: MiningEvent) {
        if self.tx.send(Dispatch::Event(event)).is_err() {
            log::trace!("Event dropped: dispatcher closed");
        }
    }
}

/// The dispatcher thread of one session
pub struct Dispatcher {
    tx: Sender<Dispatch>,
    thread: ThreadId,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Starts a dispatcher delivering to `bus`
    ///
    /// # Errors
    /// `MinerError::IoError` if the thread cannot be spawned
    pub fn spawn(bus: Arc<EventBus>) -> Result<Self, MinerError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("miner-events".into())
            .spawn(move || {
                for message in rx {
                    match message {
                        Dispatch::Event(event) => bus.deliver(&event),
                        Dispatch::Close => break,
                    }
                }
                log::debug!("Event dispatcher exited");
            })?;

        Ok(Dispatcher {
            tx,
            thread: handle.thread().id(),
            handle,
        })
    }

    /// Handle for emitting events
    pub fn sink(&self) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
        }
    }

    /// Delivers everything already queued, then ends the thread
    ///
    /// Joins unless called from the dispatcher thread itself (a callback
    /// stopping the coordinator), in which case the thread exits on its own
    /// after the current callback returns.
    pub fn close(self) {
        let _ = self.tx.send(Dispatch::Close);
        if thread::current().id() == self.thread {
            return;
        }
        if self.handle.join().is_err() {
            log::error!("Event dispatcher panicked");
        }
    }
}
