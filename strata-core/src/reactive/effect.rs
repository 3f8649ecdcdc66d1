//! Effect Scheduling
//!
//! Effects are change callbacks registered with [`Signal::on_change`]. They
//! never run inside a write. Instead, every signal visited by a propagation
//! wave queues its effects here, and the scheduler asks the host for one
//! deferred task that runs the whole batch.
//!
//! # How a Flush Works
//!
//! 1. `schedule_effect` adds a callback to the pending set. A callback that
//!    is already pending is not added twice, so N writes in one turn run it
//!    once.
//!
//! 2. `execute` defers a flush through the [`TaskQueue`], unless one is
//!    already in flight.
//!
//! 3. The flush takes the pending set and clears the in-flight flag before
//!    calling anything. Effects that write signals therefore schedule a new
//!    flush instead of extending the current one.
//!
//! # Host Task Queues
//!
//! The scheduler only needs "run this once, after the current synchronous
//! code, before anything deferred later". [`TickQueue`] provides that as an
//! explicit FIFO the caller drains; [`TokioLocalQueue`] maps it onto
//! `tokio::task::spawn_local`.
//!
//! [`Signal::on_change`]: super::Signal::on_change

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::graph::EffectFn;

/// Unique identifier for a registered effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of deferred work handed to the host.
pub type Task = Box<dyn FnOnce()>;

/// The host's deferred-task primitive.
///
/// `defer` must run `task` exactly once, after the current synchronous
/// execution has unwound, and before any task deferred after it.
pub trait TaskQueue {
    fn defer(&self, task: Task);
}

/// An in-process FIFO of deferred tasks.
///
/// Nothing runs until the owner calls [`TickQueue::run_until_idle`].
#[derive(Default)]
pub struct TickQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl TickQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued tasks in order until the queue is empty, including tasks
    /// deferred by the tasks themselves. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Get the number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl TaskQueue for TickQueue {
    fn defer(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

/// Defers tasks onto the current `tokio::task::LocalSet`.
///
/// # Panics
///
/// `defer` panics when called outside a `LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLocalQueue;

impl TaskQueue for TokioLocalQueue {
    fn defer(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}

/// What a flush does when an effect callback panics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EffectPanicPolicy {
    /// Keep running the rest of the batch, then re-raise the first panic.
    #[default]
    Isolate,

    /// Stop at the first panic; the rest of the batch is dropped.
    Abort,
}

/// Batches effect callbacks into one deferred flush per tick.
#[derive(Clone)]
pub struct EffectScheduler {
    inner: Rc<SchedulerInner>,
}

struct SchedulerInner {
    pending: RefCell<IndexMap<EffectId, EffectFn>>,
    in_flight: Cell<bool>,
    host: Rc<dyn TaskQueue>,
    policy: EffectPanicPolicy,
}

impl EffectScheduler {
    pub fn new(host: Rc<dyn TaskQueue>, policy: EffectPanicPolicy) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                pending: RefCell::new(IndexMap::new()),
                in_flight: Cell::new(false),
                host,
                policy,
            }),
        }
    }

    /// Add an effect to the next flush.
    pub fn schedule_effect(&self, id: EffectId, effect: EffectFn) {
        let mut pending = self.inner.pending.borrow_mut();
        if !pending.contains_key(&id) {
            tracing::trace!(effect = ?id, "effect queued");
            pending.insert(id, effect);
        }
    }

    /// Defer a flush of the pending effects, unless one is already in flight.
    pub fn execute(&self) {
        if self.inner.in_flight.get() || self.inner.pending.borrow().is_empty() {
            return;
        }

        self.inner.in_flight.set(true);
        tracing::trace!(pending = self.pending_count(), "effect flush deferred");

        // Weak, so a task still queued after the runtime is dropped does not
        // keep the scheduler (and its host) alive.
        let scheduler = Rc::downgrade(&self.inner);
        self.inner.host.defer(Box::new(move || {
            if let Some(inner) = scheduler.upgrade() {
                EffectScheduler { inner }.flush();
            }
        }));
    }

    /// Run every pending effect now, in the order they were queued.
    pub fn flush(&self) {
        let batch = std::mem::take(&mut *self.inner.pending.borrow_mut());
        self.inner.in_flight.set(false);

        if batch.is_empty() {
            return;
        }
        tracing::debug!(effects = batch.len(), "flushing effects");

        match self.inner.policy {
            EffectPanicPolicy::Abort => {
                for (index, (id, effect)) in batch.iter().enumerate() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| effect())) {
                        tracing::error!(
                            effect = ?id,
                            message = panic_message(payload.as_ref()),
                            dropped = batch.len() - index - 1,
                            "effect panicked, flush aborted"
                        );
                        panic::resume_unwind(payload);
                    }
                }
            }
            EffectPanicPolicy::Isolate => {
                let mut first_panic = None;
                for (id, effect) in &batch {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| effect())) {
                        tracing::error!(
                            effect = ?id,
                            message = panic_message(payload.as_ref()),
                            "effect panicked"
                        );
                        first_panic.get_or_insert(payload);
                    }
                }
                if let Some(payload) = first_panic {
                    panic::resume_unwind(payload);
                }
            }
        }
    }

    /// Get the number of effects waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Whether a flush has been deferred and has not started yet.
    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.get()
    }

    pub fn policy(&self) -> EffectPanicPolicy {
        self.inner.policy
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
