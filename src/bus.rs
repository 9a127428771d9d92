//! The bus: an ordered message channel from elements to the application.
//!
//! Producers never block. The bus keeps one primary queue that is drained
//! with [`Bus::pop`], [`Bus::pop_filtered`] or [`Bus::poll`]; each message
//! in it is delivered to at most one reader. Observers that need their own
//! copy call [`Bus::subscribe`] and receive a clone of every message
//! posted after subscribing.
//!
//! # Example
//!
//! ```rust
//! use parallax_state::bus::Bus;
//! use parallax_state::message::{Message, MessageType};
//! use parallax_state::state::State;
//!
//! let bus = Bus::new();
//! bus.post(Message::state_changed("sink", State::Null, State::Ready, None));
//!
//! let msg = bus.pop_filtered(MessageType::STATE_CHANGED).unwrap();
//! assert_eq!(msg.source(), "sink");
//! assert!(!bus.have_pending());
//! ```

use crate::message::{Message, MessageType};
use crate::observability::{record_bus_message_posted, record_bus_queue_depth};
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Configuration for a bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Name used in logs and metrics.
    pub name: String,
    /// Maximum queued messages; `None` is unbounded.
    ///
    /// When the queue is full new messages are dropped with a warning, so
    /// producers never wait on the consumer.
    pub capacity: Option<usize>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: "bus".to_string(),
            capacity: None,
        }
    }
}

impl BusConfig {
    /// Set the bus name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Cap the queue length.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Verdict of a sync handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusSyncReply {
    /// Queue the message as usual.
    Pass,
    /// Discard the message.
    Drop,
}

type SyncHandler = dyn Fn(&Bus, &Message) -> BusSyncReply + Send + Sync;

struct BusInner {
    config: BusConfig,
    tx: kanal::Sender<Message>,
    rx: kanal::Receiver<Message>,
    flushing: AtomicBool,
    sync_handler: Mutex<Option<Arc<SyncHandler>>>,
    watchers: Mutex<Vec<kanal::Sender<Message>>>,
}

/// Multiple-producer message queue read by the application.
///
/// Cloning a `Bus` yields another handle to the same queue.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    /// Create an unbounded bus.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus from a configuration.
    pub fn with_config(config: BusConfig) -> Self {
        let (tx, rx) = match config.capacity {
            Some(capacity) => kanal::bounded(capacity),
            None => kanal::unbounded(),
        };
        Self {
            inner: Arc::new(BusInner {
                config,
                tx,
                rx,
                flushing: AtomicBool::new(false),
                sync_handler: Mutex::new(None),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Name of the bus.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Post a message.
    ///
    /// Runs the sync handler on the calling thread, queues the message and
    /// hands a clone to every watcher. Returns `false` if the message was
    /// dropped (flushing, sync handler, or full queue); watchers never see
    /// a dropped message.
    ///
    /// Elements post while holding their own state lock, so a sync handler
    /// must not change the state of the element that posted the message.
    /// Reading it is fine: `current_state`, `pending_state` and
    /// `get_state(Some(Duration::ZERO))` never wait on the poster.
    pub fn post(&self, message: Message) -> bool {
        if self.inner.flushing.load(Ordering::Acquire) {
            tracing::trace!(bus = %self.name(), %message, "bus flushing, dropping message");
            return false;
        }

        let handler = lock(&self.inner.sync_handler).clone();
        if let Some(handler) = handler {
            if handler(self, &message) == BusSyncReply::Drop {
                tracing::trace!(bus = %self.name(), %message, "message dropped by sync handler");
                return false;
            }
        }

        let mut watchers = lock(&self.inner.watchers);
        let copy = (!watchers.is_empty()).then(|| message.clone());

        // The channel is bounded by the capacity; a refused send is the
        // full-queue check and leaves the message in the slot.
        let mut slot = Some(message);
        match self.inner.tx.try_send_option(&mut slot) {
            Ok(true) => {}
            Ok(false) => {
                if let Some(message) = slot {
                    tracing::warn!(
                        bus = %self.name(),
                        capacity = ?self.inner.config.capacity,
                        %message,
                        "bus full, dropping message"
                    );
                }
                return false;
            }
            Err(_) => return false,
        }

        if let Some(copy) = copy {
            watchers.retain(|w| w.send(copy.clone()).is_ok());
        }
        drop(watchers);

        record_bus_message_posted(self.name());
        record_bus_queue_depth(self.name(), self.inner.rx.len());
        true
    }

    /// Pop the next message without blocking.
    pub fn pop(&self) -> Option<Message> {
        self.pop_filtered(MessageType::ANY)
    }

    /// Pop the next message of a type in `mask` without blocking.
    ///
    /// Messages of other types ahead of it are discarded.
    pub fn pop_filtered(&self, mask: MessageType) -> Option<Message> {
        self.timed_pop_filtered(Some(Duration::ZERO), mask)
    }

    /// Pop the next message of a type in `mask`, waiting up to `timeout`.
    ///
    /// `None` waits forever. Messages of other types are discarded while
    /// waiting.
    pub fn timed_pop_filtered(
        &self,
        timeout: Option<Duration>,
        mask: MessageType,
    ) -> Option<Message> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let message = match deadline {
                None => self.inner.rx.recv().ok()?,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        match self.inner.rx.try_recv() {
                            Ok(Some(message)) => message,
                            _ => return None,
                        }
                    } else {
                        self.inner.rx.recv_timeout(remaining).ok()?
                    }
                }
            };
            record_bus_queue_depth(self.name(), self.inner.rx.len());
            if message.matches(mask) {
                return Some(message);
            }
            tracing::trace!(bus = %self.name(), %message, "discarding unmatched message");
        }
    }

    /// Wait up to `timeout` for a message of a type in `mask`.
    ///
    /// Same semantics as [`Bus::timed_pop_filtered`].
    pub fn poll(&self, mask: MessageType, timeout: Option<Duration>) -> Option<Message> {
        self.timed_pop_filtered(timeout, mask)
    }

    /// Whether messages are queued.
    pub fn have_pending(&self) -> bool {
        !self.inner.rx.is_empty()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.inner.rx.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.rx.is_empty()
    }

    /// Drop queued messages and, while `flushing` is set, all new ones.
    pub fn set_flushing(&self, flushing: bool) {
        self.inner.flushing.store(flushing, Ordering::Release);
        if flushing {
            self.flush();
        }
    }

    /// Whether the bus is flushing.
    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.load(Ordering::Acquire)
    }

    /// Drop all queued messages.
    pub fn flush(&self) {
        let mut dropped = 0usize;
        while let Ok(Some(_)) = self.inner.rx.try_recv() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(bus = %self.name(), dropped, "flushed bus");
        }
        record_bus_queue_depth(self.name(), 0);
    }

    /// Install a handler that sees every message on the posting thread.
    pub fn set_sync_handler<F>(&self, handler: F)
    where
        F: Fn(&Bus, &Message) -> BusSyncReply + Send + Sync + 'static,
    {
        *lock(&self.inner.sync_handler) = Some(Arc::new(handler));
    }

    /// Remove the sync handler.
    pub fn unset_sync_handler(&self) {
        *lock(&self.inner.sync_handler) = None;
    }

    /// Receive a copy of every message posted from now on.
    pub fn subscribe(&self) -> BusWatch {
        let (tx, rx) = kanal::unbounded();
        lock(&self.inner.watchers).push(tx);
        BusWatch { rx }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.name())
            .field("pending", &self.len())
            .field("flushing", &self.is_flushing())
            .finish()
    }
}

/// A subscriber that receives a clone of every message.
///
/// Dropping the watch unsubscribes it on the next post.
pub struct BusWatch {
    rx: kanal::Receiver<Message>,
}

impl BusWatch {
    /// Block until the next message.
    ///
    /// Returns `None` once the bus is gone.
    pub fn recv(&self) -> Option<Message> {
        self.rx.recv().ok()
    }

    /// Next message if one is queued.
    pub fn try_recv(&self) -> Option<Message> {
        match self.rx.try_recv() {
            Ok(Some(message)) => Some(message),
            _ => None,
        }
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Message> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Receive the next message asynchronously.
    pub async fn recv_async(&self) -> Option<Message> {
        self.rx.as_async().recv().await.ok()
    }

    /// Receive the next message asynchronously, giving up after `timeout`.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn recv_timeout_async(&self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.rx.as_async().recv())
            .await
            .ok()?
            .ok()
    }

    /// Wait for a message of a type in `mask`, skipping others.
    pub async fn wait_for(&self, mask: MessageType) -> Option<Message> {
        loop {
            let message = self.recv_async().await?;
            if message.matches(mask) {
                return Some(message);
            }
        }
    }
}
