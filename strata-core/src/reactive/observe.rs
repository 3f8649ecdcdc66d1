//! Mutation Observer
//!
//! An [`Observer`] owns a value and a callback, and raises the callback
//! whenever the value changes in place. Reads never notify.
//!
//! # Classifying Operations
//!
//! Mutation is detected through an explicit view, [`ObservedMut`], handed to
//! the closure passed to [`Observer::modify`]. The view dereferences to the
//! value, and the receiver of each method decides the category:
//!
//! | Category | Mutating (`&mut self`) | Non-mutating (`&self`) |
//! |---|---|---|
//! | set-like (`HashSet`, `BTreeSet`) | `insert`, `remove`, `clear`, `retain` | `contains`, `len`, `iter` |
//! | map-like (`HashMap`, `BTreeMap`) | `insert`, `remove`, `entry`, `clear` | `get`, `contains_key`, `keys`, `values` |
//! | sequence-like (`Vec`, `VecDeque`) | `push`, `pop`, `insert`, `sort`, `reverse` | `len`, `first`, `iter` |
//! | date-like (`SystemTime`, `Duration`) | `+=`, `-=`, assignment | `duration_since`, comparisons |
//! | byte-buffer-like (`Vec<u8>`, `Box<[u8]>`) | `reverse`, `sort`, `fill`, `copy_within`, `resize`, [`slice`](ObservedMut::slice), [`byte_len`](ObservedMut::byte_len) | `len`, indexing |
//! | function-like (`Box<dyn Fn>`, `Rc<dyn Fn>`) | reassignment | calling |
//! | pattern/future-like handles | reassignment | every `&self` method |
//!
//! Any `&mut` access through the view counts as a mutation, whether or not
//! the value actually ended up different. Interior mutability (`Cell`,
//! `RefCell`) changes state behind `&self`; call [`ObservedMut::touch`] when
//! using it.
//!
//! Byte buffers over-notify: the view's own [`ObservedMut::slice`] and
//! [`ObservedMut::byte_len`] count as mutations even though they only read,
//! so a copy taken from a buffer invalidates whatever depends on it. Going
//! through `Deref` (`b[..2].to_vec()`, `b.len()`) stays a plain read.
//!
//! # Nested Values
//!
//! [`ObservedMut::project`] narrows the view to a field. The narrowed view
//! shares the root's notification, so `a.b.c = 1` made through
//! `project(|a| &mut a.b)` is observed by the owner of `a`.
//!
//! # When the Callback Runs
//!
//! The callback runs once, after the closure returns and the value is no
//! longer borrowed, so it may freely read the observer again.
//!
//! Inside the closure the value is exclusively borrowed. Reaching the same
//! observer from there is refused: [`Observer::try_read`] returns `None` and
//! [`Observer::is_modifying`] returns `true`.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::ops::{Bound, Deref, DerefMut, RangeBounds};

/// Callback invoked after an observed value changed.
pub type OnMutate = Box<dyn Fn()>;

/// A value whose in-place mutations raise a callback.
pub struct Observer<T> {
    value: RefCell<T>,
    on_mutate: OnMutate,
}

impl<T> Observer<T> {
    /// Wrap `value` so that mutations through this observer call `on_mutate`.
    pub fn wrap<F>(value: T, on_mutate: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            value: RefCell::new(value),
            on_mutate: Box::new(on_mutate),
        }
    }

    /// Read the value without notifying.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Read the value without notifying, or `None` while a
    /// [`modify`](Self::modify) closure holds it.
    pub fn try_read<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.value.try_borrow().ok().map(|value| f(&value))
    }

    /// Whether a [`modify`](Self::modify) closure is running right now.
    pub fn is_modifying(&self) -> bool {
        self.value.try_borrow().is_err()
    }

    /// Borrow the value without notifying.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.value.borrow()
    }

    /// Run `f` with a mutation-tracking view of the value.
    ///
    /// The callback fires once after `f` returns if `f` made any mutating
    /// access.
    pub fn modify<R>(&self, f: impl FnOnce(&mut ObservedMut<'_, T>) -> R) -> R {
        let touched = Cell::new(false);
        let result = {
            let mut value = self.value.borrow_mut();
            let mut view = ObservedMut::new(&mut *value, &touched);
            f(&mut view)
        };

        if touched.get() {
            (self.on_mutate)();
        }
        result
    }

    /// Replace the whole value. Always notifies, even if the new value is
    /// equal to the old one.
    pub fn replace(&self, value: T) -> T {
        let previous = self.value.replace(value);
        (self.on_mutate)();
        previous
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: fmt::Debug> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

/// A mutation-tracking view of an observed value or one of its fields.
pub struct ObservedMut<'a, T: ?Sized> {
    value: &'a mut T,
    touched: &'a Cell<bool>,
}

impl<'a, T: ?Sized> ObservedMut<'a, T> {
    pub(crate) fn new(value: &'a mut T, touched: &'a Cell<bool>) -> Self {
        Self { value, touched }
    }

    /// Narrow the view to a nested field. Reaching the field is a read; only
    /// mutating it notifies.
    pub fn project<U: ?Sized>(&mut self, f: impl FnOnce(&mut T) -> &mut U) -> ObservedMut<'_, U> {
        ObservedMut {
            value: f(&mut *self.value),
            touched: self.touched,
        }
    }

    /// Like [`project`](Self::project), for fields that may be absent.
    pub fn try_project<U: ?Sized>(
        &mut self,
        f: impl FnOnce(&mut T) -> Option<&mut U>,
    ) -> Option<ObservedMut<'_, U>> {
        let touched = self.touched;
        f(&mut *self.value).map(|value| ObservedMut { value, touched })
    }

    /// Record a mutation that happened behind a shared reference.
    pub fn touch(&self) {
        self.touched.set(true);
    }

    /// Whether any mutation has been recorded so far.
    pub fn is_touched(&self) -> bool {
        self.touched.get()
    }
}

impl<T> ObservedMut<'_, T> {
    /// Overwrite the value. Always counts as a mutation.
    pub fn set(&mut self, value: T) -> T {
        self.touch();
        std::mem::replace(&mut *self.value, value)
    }
}

impl<B> ObservedMut<'_, B>
where
    B: AsRef<[u8]> + AsMut<[u8]> + ?Sized,
{
    /// Copy a range of the buffer. Counts as a mutation.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Vec<u8> {
        self.touch();
        let bounds: (Bound<usize>, Bound<usize>) =
            (range.start_bound().cloned(), range.end_bound().cloned());
        let bytes: &[u8] = (*self.value).as_ref();
        bytes[bounds].to_vec()
    }

    /// Length of the buffer in bytes. Counts as a mutation.
    pub fn byte_len(&self) -> usize {
        self.touch();
        let bytes: &[u8] = (*self.value).as_ref();
        bytes.len()
    }
}

impl<T: ?Sized> Deref for ObservedMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.value
    }
}

impl<T: ?Sized> DerefMut for ObservedMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.touch();
        &mut *self.value
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ObservedMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedMut")
            .field("value", &self.value)
            .field("touched", &self.touched.get())
            .finish()
    }
}
