//! Integration Tests for Reactive System
//!
//! These tests verify that signals, derived signals and effects work
//! together correctly through the public API.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use strata_core::reactive::TokioLocalQueue;
use strata_core::{EffectPanicPolicy, ReactiveError, Runtime, Signal};

fn derived<T, U>(runtime: &Runtime, source: &Signal<T>, f: impl Fn(T) -> U + 'static) -> Signal<U>
where
    T: Clone + 'static,
    U: Clone + 'static,
{
    let source = source.clone();
    runtime.computed(move || f(source.get()))
}

/// Test that a derived signal tracks its source.
#[test]
fn derived_signal_tracks_source() {
    let runtime = Runtime::new();
    let signal = runtime.signal(10);
    let doubled = derived(&runtime, &signal, |v| v * 2);

    // First access computes the value
    assert_eq!(doubled.get(), 20);
    assert!(signal.has_listener(&doubled));

    // Writing the source is enough; no manual invalidation.
    signal.set(5);
    assert_eq!(doubled.get(), 10);
}

/// Test that derived signals cache values correctly.
#[test]
fn derived_signal_caches_expensive_computation() {
    let runtime = Runtime::new();
    let compute_count = Rc::new(Cell::new(0));
    let compute_clone = Rc::clone(&compute_count);

    let value = runtime.computed(move || {
        compute_clone.set(compute_clone.get() + 1);
        42
    });

    // First access computes
    assert_eq!(value.get(), 42);
    assert_eq!(compute_count.get(), 1);

    // Subsequent accesses use cache
    assert_eq!(value.get(), 42);
    assert_eq!(value.get(), 42);
    assert_eq!(value.get(), 42);
    assert_eq!(compute_count.get(), 1);
}

/// Test that derived signals can depend on other derived signals.
#[test]
fn derived_signal_chain() {
    let runtime = Runtime::new();
    let base = runtime.signal(1);
    let doubled = derived(&runtime, &base, |v| v * 2);
    let quadrupled = derived(&runtime, &doubled, |v| v * 2);

    assert_eq!(quadrupled.get(), 4);
    assert_eq!(
        (base.depth(), doubled.depth(), quadrupled.depth()),
        (0, 1, 2)
    );

    base.set(2);
    assert!(quadrupled.is_dirty());
    assert_eq!(quadrupled.get(), 8);
}

/// Test that the bottom of a diamond recomputes once per change.
#[test]
fn diamond_dependency() {
    let runtime = Runtime::new();
    let a = runtime.signal(1);
    let left = derived(&runtime, &a, |v| v + 1);
    let right = derived(&runtime, &a, |v| v * 100);

    let runs = Rc::new(Cell::new(0));
    let bottom = {
        let (left, right, runs) = (left.clone(), right.clone(), Rc::clone(&runs));
        runtime.computed(move || {
            runs.set(runs.get() + 1);
            left.get() + right.get()
        })
    };

    assert_eq!(bottom.get(), 102);
    for value in 2..5 {
        a.set(value);
        assert_eq!(bottom.get(), value + 1 + value * 100);
    }
    assert_eq!(runs.get(), 4);
}

/// Test that writing a derived signal's current value changes nothing.
#[test]
fn equal_write_to_derived_signal_is_ignored() {
    let runtime = Runtime::new();
    let a = runtime.signal(3);
    let b = derived(&runtime, &a, |v| v);
    let c = derived(&runtime, &b, |v| v + 1);
    let changes = Rc::new(Cell::new(0));
    {
        let changes = Rc::clone(&changes);
        b.on_change(move || changes.set(changes.get() + 1));
    }
    assert_eq!(c.get(), 4);

    b.set(3);
    assert!(b.is_computed());
    assert!(!c.is_dirty());
    assert_eq!(runtime.run_until_idle(), 0);

    a.set(10);
    assert_eq!(c.get(), 11);
    runtime.run_until_idle();
    assert_eq!(changes.get(), 1);
}

/// Test that a byte buffer copy taken through `slice` invalidates readers.
#[test]
fn byte_buffer_copy_invalidates_readers() {
    let runtime = Runtime::new();
    let buffer = runtime.signal(vec![1u8, 2, 3]);
    let checksum = derived(&runtime, &buffer, |bytes| bytes.iter().map(|&b| u32::from(b)).sum::<u32>());
    assert_eq!(checksum.get(), 6);

    assert_eq!(buffer.modify(|bytes| bytes[..2].to_vec()), Some(vec![1, 2]));
    assert!(!checksum.is_dirty());

    assert_eq!(buffer.modify(|bytes| bytes.slice(..2)), Some(vec![1, 2]));
    assert!(checksum.is_dirty());
    assert_eq!(checksum.get(), 6);
}

/// Test that several writes in one turn run an effect once.
#[test]
fn effects_are_batched_per_tick() {
    let runtime = Runtime::new();
    let count = runtime.signal(0);
    let observed = Rc::new(RefCell::new(Vec::new()));

    {
        let (count_in_effect, observed) = (count.clone(), Rc::clone(&observed));
        count.on_change(move || observed.borrow_mut().push(count_in_effect.get()));
    }

    for value in 1..=5 {
        count.set(value);
    }
    assert!(observed.borrow().is_empty());

    assert_eq!(runtime.run_until_idle(), 1);
    assert_eq!(*observed.borrow(), vec![5]);
}

/// Test that an effect writing another signal schedules a second flush.
#[test]
fn effect_writes_flush_on_the_next_tick() {
    let runtime = Runtime::new();
    let celsius = runtime.signal(0.0);
    let fahrenheit = runtime.signal(32.0);
    let printed = Rc::new(RefCell::new(Vec::new()));

    {
        let (celsius_in_effect, fahrenheit) = (celsius.clone(), fahrenheit.clone());
        celsius.on_change(move || fahrenheit.set(celsius_in_effect.get() * 9.0 / 5.0 + 32.0));
    }
    {
        let (fahrenheit_in_effect, printed) = (fahrenheit.clone(), Rc::clone(&printed));
        fahrenheit.on_change(move || printed.borrow_mut().push(fahrenheit_in_effect.get()));
    }

    celsius.set(100.0);

    assert_eq!(runtime.run_until_idle(), 2);
    assert_eq!(*printed.borrow(), vec![212.0]);
}

/// Test that in-place mutation of a map invalidates readers.
#[test]
fn map_mutation_invalidates_readers() {
    let runtime = Runtime::new();
    let scores = runtime.signal(HashMap::from([("ada", 3), ("bob", 5)]));
    let total = derived(&runtime, &scores, |scores| scores.values().sum::<i32>());
    let changes = Rc::new(Cell::new(0));
    {
        let changes = Rc::clone(&changes);
        total.on_change(move || changes.set(changes.get() + 1));
    }

    assert_eq!(total.get(), 8);

    // Lookups are reads.
    assert_eq!(scores.modify(|scores| scores.get("ada").copied()), Some(Some(3)));
    assert!(!total.is_dirty());

    scores.modify(|scores| {
        scores.insert("cy", 2);
        *scores.entry("bob").or_default() += 1;
    });
    assert!(total.is_dirty());
    assert_eq!(total.get(), 11);

    runtime.run_until_idle();
    assert_eq!(changes.get(), 1);
}

/// Test that a cycle surfaces as an error at the outermost read.
#[test]
fn cycles_are_reported() {
    let runtime = Runtime::new();
    let a = runtime.signal(1);
    let b = derived(&runtime, &a, |v| v + 1);
    {
        let b = b.clone();
        a.set_computed(move || b.get() * 2);
    }

    let err = b.try_get().unwrap_err();
    let ReactiveError::CyclicDependency { signal, path } = &err else {
        panic!("expected a cycle, got {err}");
    };
    assert_eq!(*signal, b.id());
    assert_eq!(*path, vec![b.id(), a.id()]);
    assert!(err.to_string().starts_with("cyclic dependency"));

    // Breaking the cycle makes the graph readable again.
    a.set(3);
    assert_eq!(b.get(), 4);
}

/// Test that an isolated effect panic does not starve the rest of the batch.
#[test]
fn effect_panics_are_isolated() {
    let runtime = Runtime::builder()
        .effect_panics(EffectPanicPolicy::Isolate)
        .build();
    let signal = runtime.signal(0);
    let ran = Rc::new(Cell::new(false));

    signal.on_change(|| panic!("effect failed"));
    {
        let ran = Rc::clone(&ran);
        signal.on_change(move || ran.set(true));
    }

    signal.set(1);
    let result = panic::catch_unwind(AssertUnwindSafe(|| runtime.run_until_idle()));

    assert!(result.is_err());
    assert!(ran.get());
    assert_eq!(runtime.effects().pending_count(), 0);
}

/// Test that dropped signals disappear from the graph.
#[test]
fn dropped_signals_are_pruned() {
    let runtime = Runtime::new();
    let source = runtime.signal(1);

    let readers: Vec<_> = (0..3).map(|i| derived(&runtime, &source, move |v| v + i)).collect();
    for reader in &readers {
        reader.get();
    }
    assert_eq!(source.listener_count(), 3);

    drop(readers);
    assert_eq!(source.listener_count(), 0);
}

/// Test the graph snapshot of a derived signal.
#[test]
fn signal_info_snapshot() {
    let runtime = Runtime::new();
    let a = runtime.signal(2);
    let b = derived(&runtime, &a, |v| v * 3);
    b.on_change(|| {});
    b.get();

    let json = serde_json::to_value(b.info()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "id": b.id().raw(),
            "depth": 1,
            "dirty": false,
            "computed": true,
            "sources": [a.id().raw()],
            "listeners": [],
            "effects": 1,
        })
    );
}

/// Test that effects run on a tokio `LocalSet` when it is the task queue.
#[tokio::test(flavor = "current_thread")]
async fn effects_run_on_a_local_set() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let runtime = Runtime::builder().task_queue(Rc::new(TokioLocalQueue)).build();
            let signal = runtime.signal(0);
            let runs = Rc::new(Cell::new(0));
            {
                let runs = Rc::clone(&runs);
                signal.on_change(move || runs.set(runs.get() + 1));
            }

            signal.set(1);
            signal.set(2);
            assert_eq!(runs.get(), 0);

            // Spawned after the flush, so it completes after it.
            tokio::task::spawn_local(async {}).await.unwrap();
            assert_eq!(runs.get(), 1);
        })
        .await;
}
