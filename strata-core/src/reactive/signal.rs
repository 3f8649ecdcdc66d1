//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds either a literal
//! value or a producer function, caches the last computed value and tracks
//! which signals depend on it.
//!
//! # How Signals Work
//!
//! 1. Reading a dirty signal evaluates it. A producer runs with the signal
//!    pushed onto the runtime's computation context, so every signal it reads
//!    becomes one of its sources.
//!
//! 2. Reading a clean signal returns the cache without running anything.
//!
//! 3. Writing a signal (or mutating its value in place through
//!    [`Signal::modify`]) marks it dirty and hands it to the runtime, which
//!    marks every transitive listener dirty in depth order and defers the
//!    affected effects.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A graph node (id, depth, dirty flag, weak edges, effects)
//! - The slot, wrapped in an [`Observer`] that reports in-place mutation
//! - The cache
//! - A handle to its runtime
//!
//! Cloning a `Signal` clones the handle, not the value.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde::Serialize;

use super::effect::EffectId;
use super::observe::{ObservedMut, Observer};
use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};
use crate::graph::{Node, NodeId};

/// What a signal holds: a value, or the function that derives it.
enum Slot<T> {
    Value(T),
    Computed(Rc<dyn Fn() -> T>),
}

impl<T: Clone> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Slot::Value(value) => Slot::Value(value.clone()),
            Slot::Computed(producer) => Slot::Computed(Rc::clone(producer)),
        }
    }
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use strata_core::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.signal(2);
/// let doubled = {
///     let count = count.clone();
///     runtime.computed(move || count.get() * 2)
/// };
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    node: Rc<Node>,
    slot: Observer<Slot<T>>,
    /// Last evaluated value. Only meaningful while the node is clean.
    cache: RefCell<Option<T>>,
    runtime: Runtime,
}

impl<T> Signal<T>
where
    T: Clone + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self::with_slot(runtime, Slot::Value(value))
    }

    /// Create a signal whose value is derived by `producer`.
    ///
    /// The producer does not run until the signal is first read.
    pub fn computed<F>(runtime: &Runtime, producer: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_slot(runtime, Slot::Computed(Rc::new(producer)))
    }

    fn with_slot(runtime: &Runtime, slot: Slot<T>) -> Self {
        let node = Rc::new(Node::new());

        let weak = Rc::downgrade(&node);
        let notify = runtime.clone();
        let slot = Observer::wrap(slot, move || {
            if let Some(node) = weak.upgrade() {
                tracing::debug!(signal = %node.id(), "signal value changed");
                notify.mark_changed(&node);
            }
        });

        Self {
            inner: Rc::new(SignalInner {
                node,
                slot,
                cache: RefCell::new(None),
                runtime: runtime.clone(),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.node.id()
    }

    /// Get the current value.
    ///
    /// Recomputes if the signal is dirty. If called while another signal's
    /// producer is running, this signal becomes one of its sources.
    ///
    /// # Panics
    ///
    /// Panics with a [`ReactiveError`] payload if evaluating the signal
    /// would re-enter a signal that is already being computed. Use
    /// [`try_get`](Self::try_get) to receive the error instead.
    pub fn get(&self) -> T {
        match self.read(true) {
            Ok(value) => value,
            Err(err) => panic::panic_any(err),
        }
    }

    /// Get the current value, reporting cycles as an error.
    ///
    /// A cycle detected in a nested read further down the graph is
    /// reported here as well. Inside this signal's own
    /// [`modify`](Self::modify) closure the read succeeds from a clean
    /// cache and otherwise fails with [`ReactiveError::ModifiedInPlace`].
    pub fn try_get(&self) -> Result<T> {
        catch_reactive(|| self.read(true))
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        match self.read(false) {
            Ok(value) => value,
            Err(err) => panic::panic_any(err),
        }
    }

    fn read(&self, track: bool) -> Result<T> {
        let value = self.current()?;
        if track {
            self.inner.runtime.track(&self.inner.node);
        }
        Ok(value)
    }

    fn current(&self) -> Result<T> {
        if !self.inner.node.is_dirty() {
            if let Some(value) = self.inner.cache.borrow().as_ref() {
                return Ok(value.clone());
            }
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<T> {
        let node = &self.inner.node;

        // Clone out of the observer so no borrow is held while the producer
        // reads other signals.
        let slot = self
            .inner
            .slot
            .try_read(|slot| slot.clone())
            .ok_or(ReactiveError::ModifiedInPlace { signal: node.id() })?;
        let value = match slot {
            Slot::Value(value) => value,
            Slot::Computed(producer) => {
                let _frame = self.inner.runtime.context().enter(node)?;
                node.remove_all_sources();
                producer()
            }
        };

        *self.inner.cache.borrow_mut() = Some(value.clone());
        node.mark_clean();
        tracing::debug!(signal = %node.id(), depth = node.depth(), "signal evaluated");

        Ok(value)
    }

    /// Set a new value and notify listeners.
    ///
    /// Does nothing if the signal's current value equals `value`. For a
    /// computed signal that is its cached result (evaluated first if stale),
    /// and its producer is kept. Otherwise the slot becomes the literal
    /// `value`.
    ///
    /// # Panics
    ///
    /// Panics with [`ReactiveError::ModifiedInPlace`] when called from this
    /// signal's own [`modify`](Self::modify) closure.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        self.assert_writable();
        if self.holds(&value) {
            tracing::trace!(signal = %self.id(), "write skipped, value unchanged");
            return;
        }

        self.inner.slot.replace(Slot::Value(value));
    }

    /// Whether the current value equals `value`.
    ///
    /// A literal compares its slot, since the cache is stale while dirty.
    fn holds(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        let literal = self.inner.slot.read(|slot| match slot {
            Slot::Value(current) => Some(current == value),
            Slot::Computed(_) => None,
        });

        match literal {
            Some(equal) => equal,
            None => catch_reactive(|| self.current()).map_or(false, |current| current == *value),
        }
    }

    fn assert_writable(&self) {
        if self.inner.slot.is_modifying() {
            panic::panic_any(ReactiveError::ModifiedInPlace { signal: self.id() });
        }
    }

    /// Replace the signal's slot with a producer. Always notifies.
    pub fn set_computed<F>(&self, producer: F)
    where
        F: Fn() -> T + 'static,
    {
        self.assert_writable();
        tracing::debug!(signal = %self.id(), "signal producer replaced");
        self.inner.slot.replace(Slot::Computed(Rc::new(producer)));
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        T: PartialEq,
        F: FnOnce(&T) -> T,
    {
        let current = self.get_untracked();
        self.set(f(&current));
    }

    /// Mutate the held value in place.
    ///
    /// Listeners are notified once, after `f` returns, if `f` made any
    /// mutating access through the view. Returns `None` without calling `f`
    /// if the signal is computed.
    ///
    /// While `f` runs, the value is exclusively borrowed: reading this
    /// signal through another handle returns the clean cache or fails with
    /// [`ReactiveError::ModifiedInPlace`], and writing it panics with that
    /// error.
    ///
    /// ```rust
    /// use strata_core::Runtime;
    ///
    /// let runtime = Runtime::new();
    /// let items = runtime.signal(vec![1, 2]);
    ///
    /// items.modify(|items| items.push(3));
    /// assert_eq!(items.get(), vec![1, 2, 3]);
    /// ```
    pub fn modify<R>(&self, f: impl FnOnce(&mut ObservedMut<'_, T>) -> R) -> Option<R> {
        self.assert_writable();
        self.inner.slot.modify(|slot| {
            slot.try_project(|slot| match slot {
                Slot::Value(value) => Some(value),
                Slot::Computed(_) => None,
            })
            .map(|mut value| f(&mut value))
        })
    }

    /// Register a callback that runs after this signal changes.
    ///
    /// Callbacks are batched: any number of changes before the next flush
    /// runs the callback once. The callback is not invoked on registration.
    /// A computed signal only hears about source changes once it has been
    /// read, since reading is what links it to its sources.
    pub fn on_change<F>(&self, callback: F) -> EffectId
    where
        F: Fn() + 'static,
    {
        let id = EffectId::new();
        self.inner.node.add_effect(id, Rc::new(callback));
        tracing::trace!(signal = %self.id(), effect = ?id, "effect registered");
        id
    }

    /// Unregister a callback. Returns whether it was registered here.
    pub fn remove_effect(&self, id: EffectId) -> bool {
        self.inner.node.remove_effect(id)
    }

    /// Detach this signal from the graph.
    ///
    /// Effects are dropped, listeners are marked dirty one last time, then
    /// every edge is removed. The signal can still be read; a computed
    /// signal reconnects to its sources when it next evaluates.
    pub fn dispose(&self) {
        let node = &self.inner.node;
        tracing::debug!(signal = %node.id(), "signal disposed");

        node.clear_effects();
        self.inner.runtime.propagate(node);
        node.remove_all_listeners();
        node.remove_all_sources();
        node.mark_dirty();
    }

    /// Get the signal's topological depth.
    pub fn depth(&self) -> usize {
        self.inner.node.depth()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.node.is_dirty()
    }

    pub fn is_computed(&self) -> bool {
        // Only a literal can be in the middle of `modify`.
        self.inner
            .slot
            .try_read(|slot| matches!(slot, Slot::Computed(_)))
            .unwrap_or(false)
    }

    pub fn source_count(&self) -> usize {
        self.inner.node.source_count()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.node.listener_count()
    }

    pub fn effect_count(&self) -> usize {
        self.inner.node.effect_count()
    }

    /// Whether `other` was read during this signal's last computation.
    pub fn has_source<U>(&self, other: &Signal<U>) -> bool {
        self.inner.node.has_source(other.inner.node.id())
    }

    /// Whether `other` read this signal during its last computation.
    pub fn has_listener<U>(&self, other: &Signal<U>) -> bool {
        self.inner.node.has_listener(other.inner.node.id())
    }

    /// Snapshot of the signal's graph state.
    pub fn info(&self) -> SignalInfo {
        let node = &self.inner.node;
        SignalInfo {
            id: node.id(),
            depth: node.depth(),
            dirty: node.is_dirty(),
            computed: self.is_computed(),
            sources: node.sources().iter().map(|n| n.id()).collect(),
            listeners: node.listeners().iter().map(|n| n.id()).collect(),
            effects: node.effect_count(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }
}

impl<T> Signal<T> {
    /// Whether both handles refer to the same signal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = &self.inner.node;
        f.debug_struct("Signal")
            .field("id", &node.id())
            .field("depth", &node.depth())
            .field("dirty", &node.is_dirty())
            .field("cache", &self.inner.cache.borrow())
            .finish_non_exhaustive()
    }
}

/// Run `f`, turning a [`ReactiveError`] unwinding out of a nested `get`
/// back into `Err`. Any other panic is resumed unchanged.
fn catch_reactive<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => match payload.downcast::<ReactiveError>() {
            Ok(err) => Err(*err),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// Serializable snapshot of a signal, as returned by [`Signal::info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalInfo {
    pub id: NodeId,
    pub depth: usize,
    pub dirty: bool,
    pub computed: bool,
    pub sources: Vec<NodeId>,
    pub listeners: Vec<NodeId>,
    pub effects: usize,
}
