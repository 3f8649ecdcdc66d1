//! Reactive Runtime
//!
//! The runtime is the coordinator that connects signals to the computation
//! context and the two schedulers. Every signal is created against a
//! runtime and keeps a handle to it; nothing is global.
//!
//! # How It Works
//!
//! 1. When a signal is read while another signal's producer is running,
//!    the runtime links the two (`track`).
//!
//! 2. When a signal's value changes, the runtime:
//!    a. Marks it dirty and detaches its sources
//!    b. Queues its effects and schedules its listeners
//!    c. Drains the notification queue in depth order; every visited signal
//!       is marked dirty, queues its effects and schedules its own listeners
//!    d. Asks the effect scheduler for one deferred flush
//!
//! Derived signals are lazy: a wave only marks them dirty, they recompute on
//! their next read.
//!
//! # Threading
//!
//! A runtime and its signals live on one thread. Producers and effects may
//! write signals re-entrantly; a write loop that never settles is the
//! caller's responsibility.

use std::fmt;
use std::rc::Rc;

use super::context::ComputationContext;
use super::effect::{EffectPanicPolicy, EffectScheduler, TaskQueue, TickQueue};
use super::signal::Signal;
use crate::graph::{Node, NotificationScheduler};

/// Handle to a reactive runtime. Cloning is cheap and shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    context: ComputationContext,
    notifications: NotificationScheduler,
    effects: EffectScheduler,
    /// Present when the runtime owns its task queue.
    ticks: Option<Rc<TickQueue>>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    ///
    /// Effects are deferred onto an internal [`TickQueue`]; call
    /// [`run_until_idle`](Self::run_until_idle) to let them run.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Create a signal holding `value`.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + 'static,
    {
        Signal::new(self, value)
    }

    /// Create a signal derived from `producer`.
    pub fn computed<T, F>(&self, producer: F) -> Signal<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        Signal::computed(self, producer)
    }

    pub fn context(&self) -> &ComputationContext {
        &self.inner.context
    }

    pub fn notifications(&self) -> &NotificationScheduler {
        &self.inner.notifications
    }

    pub fn effects(&self) -> &EffectScheduler {
        &self.inner.effects
    }

    /// Whether a producer is running, i.e. reads are being tracked.
    pub fn is_tracking(&self) -> bool {
        !self.inner.context.is_empty()
    }

    /// Run deferred tasks on the runtime's own [`TickQueue`] until it is
    /// empty. Returns the number of tasks run; always 0 when the runtime was
    /// built with an external task queue.
    pub fn run_until_idle(&self) -> usize {
        self.inner
            .ticks
            .as_ref()
            .map_or(0, |ticks| ticks.run_until_idle())
    }

    /// Run pending effects immediately, bypassing the task queue.
    pub fn flush_effects(&self) {
        self.inner.effects.flush();
    }

    /// Link `source` to the signal whose producer is running, if any.
    pub(crate) fn track(&self, source: &Rc<Node>) {
        if let Some(caller) = self.inner.context.current() {
            source.add_listener(&caller);
            caller.add_source(source);
        }
    }

    /// The write path shared by `set` and structural mutation.
    pub(crate) fn mark_changed(&self, node: &Rc<Node>) {
        node.mark_dirty();
        node.remove_all_sources();
        self.propagate(node);
    }

    /// Notify everything downstream of `origin`, then request an effect flush.
    pub(crate) fn propagate(&self, origin: &Rc<Node>) {
        self.queue_effects(origin);
        self.schedule_listeners(origin);

        let mut visited = 0usize;
        while self
            .inner
            .notifications
            .execute(|node| self.source_changed(node))
        {
            visited += 1;
        }
        tracing::debug!(signal = %origin.id(), visited, "propagation wave settled");

        self.inner.effects.execute();
    }

    fn source_changed(&self, node: &Rc<Node>) {
        node.mark_dirty();
        self.queue_effects(node);
        self.schedule_listeners(node);
    }

    fn schedule_listeners(&self, node: &Rc<Node>) {
        for listener in node.listeners() {
            self.inner.notifications.schedule_signal(listener);
        }
    }

    fn queue_effects(&self, node: &Node) {
        for (id, effect) in node.effects() {
            self.inner.effects.schedule_effect(id, effect);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("evaluating", &self.inner.context.len())
            .field("queued_notifications", &self.inner.notifications.len())
            .field("pending_effects", &self.inner.effects.pending_count())
            .field("effect_panics", &self.inner.effects.policy())
            .finish()
    }
}

/// Configuration for a [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    task_queue: Option<Rc<dyn TaskQueue>>,
    effect_panics: EffectPanicPolicy,
}

impl RuntimeBuilder {
    /// Defer effect flushes onto `queue` instead of the internal tick queue.
    pub fn task_queue(mut self, queue: Rc<dyn TaskQueue>) -> Self {
        self.task_queue = Some(queue);
        self
    }

    /// Choose what a flush does when an effect panics.
    pub fn effect_panics(mut self, policy: EffectPanicPolicy) -> Self {
        self.effect_panics = policy;
        self
    }

    pub fn build(self) -> Runtime {
        let (host, ticks) = match self.task_queue {
            Some(queue) => (queue, None),
            None => {
                let ticks = Rc::new(TickQueue::new());
                let host: Rc<dyn TaskQueue> = ticks.clone();
                (host, Some(ticks))
            }
        };

        Runtime {
            inner: Rc::new(RuntimeInner {
                context: ComputationContext::new(),
                notifications: NotificationScheduler::new(),
                effects: EffectScheduler::new(host, self.effect_panics),
                ticks,
            }),
        }
    }
}
