//! The element handle and its construction.

use crate::bus::Bus;
use crate::clock::{Clock, ClockTime};
use crate::element::base::{BaseBehaviour, SinkPreroll};
use crate::element::record::StateRecord;
use crate::element::{ElementContext, ElementFlags, ElementImpl, Pad};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::observability::ElementMetrics;
use crate::pipeline::bin::{self, BinCore};
use crate::state::{State, StateChangeReturn};
use crate::sync::lock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

pub(crate) struct Leaf {
    pub(crate) imp: Mutex<Box<dyn ElementImpl>>,
    pub(crate) base: BaseBehaviour,
}

pub(crate) enum ElementKind {
    Leaf(Leaf),
    Bin(Box<BinCore>),
}

pub(crate) struct ElementInner {
    pub(crate) id: ElementId,
    pub(crate) name: Arc<str>,
    pub(crate) flags: ElementFlags,
    /// Serializes `set_state` and asynchronous continuations.
    pub(crate) state_lock: Mutex<()>,
    pub(crate) record: Mutex<StateRecord>,
    pub(crate) state_cond: Condvar,
    pub(crate) kind: ElementKind,
    pub(crate) parent: Mutex<Weak<ElementInner>>,
    pub(crate) bus: Mutex<Option<Bus>>,
    pub(crate) live: AtomicBool,
    pub(crate) locked_state: AtomicBool,
    pub(crate) base_time: AtomicU64,
    pub(crate) clock: Mutex<Option<Arc<dyn Clock>>>,
    pub(crate) src_pad: Option<Pad>,
    pub(crate) sink_pad: Option<Pad>,
    pub(crate) metrics: ElementMetrics,
}

/// Handle to an element.
///
/// Cloning yields another handle to the same element. Leaf elements are
/// built with [`Element::builder`]; bins and pipelines with
/// [`Bin::new`](crate::pipeline::Bin::new) and
/// [`Pipeline::new`](crate::pipeline::Pipeline::new).
#[derive(Clone)]
pub struct Element {
    pub(crate) inner: Arc<ElementInner>,
}

/// Weak handle to an element.
#[derive(Clone)]
pub struct WeakElement(Weak<ElementInner>);

impl WeakElement {
    /// Upgrade to a strong handle if the element is still alive.
    pub fn upgrade(&self) -> Option<Element> {
        self.0.upgrade().map(|inner| Element { inner })
    }
}

/// Builder for leaf elements.
pub struct ElementBuilder {
    name: String,
    flags: ElementFlags,
    live: bool,
    async_preroll: bool,
}

impl ElementBuilder {
    /// Set capability flags.
    pub fn flags(mut self, flags: ElementFlags) -> Self {
        self.flags = self.flags | flags;
        self
    }

    /// Mark a source as live.
    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Whether a sink waits for a buffer before completing PAUSED.
    ///
    /// Defaults to `true`.
    pub fn async_preroll(mut self, async_preroll: bool) -> Self {
        self.async_preroll = async_preroll;
        self
    }

    /// Build the element around its implementation.
    pub fn build(self, imp: impl ElementImpl) -> Element {
        let base = if self.flags.contains(ElementFlags::SINK) {
            BaseBehaviour::Sink(SinkPreroll::new(self.async_preroll))
        } else if self.flags.contains(ElementFlags::SOURCE) {
            BaseBehaviour::Source
        } else {
            BaseBehaviour::Plain
        };
        let kind = ElementKind::Leaf(Leaf {
            imp: Mutex::new(Box::new(imp)),
            base,
        });
        let element = Element::with_kind(self.name, self.flags, kind);
        element.inner.live.store(self.live, Ordering::Release);
        element
    }
}

impl Element {
    /// Start building a leaf element.
    pub fn builder(name: impl Into<String>) -> ElementBuilder {
        ElementBuilder {
            name: name.into(),
            flags: ElementFlags::NONE,
            live: false,
            async_preroll: true,
        }
    }

    pub(crate) fn with_kind(name: String, flags: ElementFlags, kind: ElementKind) -> Self {
        let is_leaf = matches!(kind, ElementKind::Leaf(_));
        let src_pad = (is_leaf && !flags.contains(ElementFlags::SINK)).then(Pad::output);
        let sink_pad = (is_leaf && !flags.contains(ElementFlags::SOURCE)).then(Pad::input);
        let metrics = ElementMetrics::new(&name);
        Self {
            inner: Arc::new(ElementInner {
                id: ElementId::next(),
                name: Arc::from(name),
                flags,
                state_lock: Mutex::new(()),
                record: Mutex::new(StateRecord::default()),
                state_cond: Condvar::new(),
                kind,
                parent: Mutex::new(Weak::new()),
                bus: Mutex::new(None),
                live: AtomicBool::new(false),
                locked_state: AtomicBool::new(flags.contains(ElementFlags::LOCKED_STATE)),
                base_time: AtomicU64::new(ClockTime::NONE.nanos()),
                clock: Mutex::new(None),
                src_pad,
                sink_pad,
                metrics,
            }),
        }
    }

    /// Element name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Process-unique identity.
    pub fn id(&self) -> ElementId {
        self.inner.id
    }

    /// Capability flags.
    pub fn flags(&self) -> ElementFlags {
        self.inner.flags
    }

    /// Whether this is a bin (or pipeline).
    pub fn is_bin(&self) -> bool {
        matches!(self.inner.kind, ElementKind::Bin(_))
    }

    /// A weak handle.
    pub fn downgrade(&self) -> WeakElement {
        WeakElement(Arc::downgrade(&self.inner))
    }

    /// The context passed to this element's hooks.
    pub fn context(&self) -> ElementContext {
        ElementContext::new(self.downgrade(), self.inner.name.clone())
    }

    pub(crate) fn bin_core(&self) -> Option<&BinCore> {
        match &self.inner.kind {
            ElementKind::Bin(core) => Some(core),
            ElementKind::Leaf(_) => None,
        }
    }

    /// The bin containing this element.
    pub fn parent(&self) -> Option<Element> {
        lock(&self.inner.parent)
            .upgrade()
            .map(|inner| Element { inner })
    }

    pub(crate) fn set_parent(&self, parent: Option<&Element>) {
        *lock(&self.inner.parent) = parent.map_or_else(Weak::new, |p| Arc::downgrade(&p.inner));
    }

    /// Whether `self` is `other` or one of its descendants.
    pub fn is_within(&self, other: &Element) -> bool {
        let mut cursor = Some(self.clone());
        while let Some(element) = cursor {
            if element == *other {
                return true;
            }
            cursor = element.parent();
        }
        false
    }

    /// The bus this element posts to when it has no parent.
    pub fn bus(&self) -> Option<Bus> {
        lock(&self.inner.bus).clone()
    }

    /// Give a top-level element its own bus.
    pub fn set_bus(&self, bus: Option<Bus>) {
        *lock(&self.inner.bus) = bus;
    }

    /// Post a message.
    ///
    /// Children post to their parent, which intercepts or forwards the
    /// message; top-level elements post to their own bus. Returns `false`
    /// if the message was dropped.
    pub fn post(&self, message: Message) -> bool {
        if let Some(parent) = self.parent() {
            if parent.bin_core().is_some() {
                return bin::handle_child_message(&parent, self, message);
            }
        }
        match self.bus() {
            Some(bus) => bus.post(message),
            None => {
                tracing::trace!(element = %self.name(), %message, "no bus, dropping message");
                false
            }
        }
    }

    /// Whether the element is a live source.
    ///
    /// Bins are never live themselves; a live child shows up in their
    /// `NoPreroll` returns.
    pub fn is_live(&self) -> bool {
        !self.is_bin() && self.inner.live.load(Ordering::Acquire)
    }

    /// Change whether a source is live.
    ///
    /// Read at the next PAUSED transition.
    pub fn set_live(&self, live: bool) {
        self.inner.live.store(live, Ordering::Release);
    }

    /// Whether parent walks skip this element.
    pub fn is_locked_state(&self) -> bool {
        self.inner.locked_state.load(Ordering::Acquire)
    }

    /// Lock or unlock the state. Returns `true` if the setting changed.
    pub fn set_locked_state(&self, locked: bool) -> bool {
        self.inner.locked_state.swap(locked, Ordering::AcqRel) != locked
    }

    /// Base time set by the pipeline, NONE before the first PLAYING.
    pub fn base_time(&self) -> ClockTime {
        ClockTime::from_nanos(self.inner.base_time.load(Ordering::Acquire))
    }

    pub(crate) fn set_base_time(&self, base_time: ClockTime) {
        self.inner
            .base_time
            .store(base_time.nanos(), Ordering::Release);
    }

    /// Clock set by the pipeline.
    pub fn clock(&self) -> Option<Arc<dyn Clock>> {
        lock(&self.inner.clock).clone()
    }

    pub(crate) fn set_clock(&self, clock: Option<Arc<dyn Clock>>) {
        *lock(&self.inner.clock) = clock;
    }

    /// A clock this element can supply to the pipeline.
    pub fn provide_clock(&self) -> Option<Arc<dyn Clock>> {
        match &self.inner.kind {
            ElementKind::Leaf(leaf) if self.flags().contains(ElementFlags::PROVIDES_CLOCK) => {
                lock(&leaf.imp).provide_clock()
            }
            ElementKind::Leaf(_) => None,
            ElementKind::Bin(core) => bin::sorted_children(self, core)
                .iter()
                .find_map(Element::provide_clock),
        }
    }

    /// The output pad, if the element has one.
    pub fn src_pad(&self) -> Option<&Pad> {
        self.inner.src_pad.as_ref()
    }

    /// The input pad, if the element has one.
    pub fn sink_pad(&self) -> Option<&Pad> {
        self.inner.sink_pad.as_ref()
    }

    /// Link this element's output pad to `downstream`'s input pad.
    pub fn link(&self, downstream: &Element) -> Result<()> {
        let src = self
            .src_pad()
            .ok_or_else(|| Error::Link(format!("'{}' has no output pad", self.name())))?;
        let sink = downstream
            .sink_pad()
            .ok_or_else(|| Error::Link(format!("'{}' has no input pad", downstream.name())))?;
        if self == downstream {
            return Err(Error::Link(format!("cannot link '{}' to itself", self.name())));
        }
        if src.is_linked() {
            return Err(Error::Link(format!("'{}:src' is already linked", self.name())));
        }
        if sink.is_linked() {
            return Err(Error::Link(format!(
                "'{}:sink' is already linked",
                downstream.name()
            )));
        }
        src.set_peer(Some(downstream.downgrade()));
        sink.set_peer(Some(self.downgrade()));
        tracing::debug!(src = %self.name(), sink = %downstream.name(), "linked");
        Ok(())
    }

    /// Link a chain of elements in order.
    pub fn link_many(elements: &[&Element]) -> Result<()> {
        for pair in elements.windows(2) {
            pair[0].link(pair[1])?;
        }
        Ok(())
    }

    /// Remove the link between this element and `downstream`.
    pub fn unlink(&self, downstream: &Element) -> Result<()> {
        let linked = self
            .src_pad()
            .and_then(Pad::peer)
            .is_some_and(|peer| peer == *downstream);
        if !linked {
            return Err(Error::Link(format!(
                "'{}' is not linked to '{}'",
                self.name(),
                downstream.name()
            )));
        }
        if let Some(pad) = self.src_pad() {
            pad.set_peer(None);
        }
        if let Some(pad) = downstream.sink_pad() {
            pad.set_peer(None);
        }
        Ok(())
    }

    /// Elements this one pushes to.
    ///
    /// For a bin: the peers of its descendants that lie outside the bin.
    pub(crate) fn downstream_peers(&self) -> Vec<Element> {
        match &self.inner.kind {
            ElementKind::Leaf(_) => self.src_pad().and_then(Pad::peer).into_iter().collect(),
            ElementKind::Bin(core) => core
                .children()
                .iter()
                .flat_map(Element::downstream_peers)
                .filter(|peer| !peer.is_within(self))
                .collect(),
        }
    }

    /// Current state without waiting.
    pub fn current_state(&self) -> State {
        lock(&self.inner.record).current
    }

    /// Pending state without waiting.
    pub fn pending_state(&self) -> Option<State> {
        lock(&self.inner.record).pending
    }

    /// Last state requested with `set_state`.
    pub fn target_state(&self) -> State {
        lock(&self.inner.record).target
    }

    /// Return of the last step.
    pub fn last_return(&self) -> StateChangeReturn {
        lock(&self.inner.record).last_return
    }

    /// Counter bumped every time the target state changes.
    pub fn state_cookie(&self) -> u64 {
        lock(&self.inner.record).cookie
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Element");
        s.field("name", &self.name()).field("flags", &self.inner.flags);
        // Debug output must not block on a record held by another thread.
        match self.inner.record.try_lock() {
            Ok(rec) => s
                .field("current", &rec.current)
                .field("pending", &rec.pending)
                .field("last_return", &rec.last_return)
                .finish(),
            Err(_) => s.finish_non_exhaustive(),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
