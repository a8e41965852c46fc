//! Scope guard that runs a closure on scope exit unless dismissed.
//!
//! The guard owns a value and hands it to the exit closure when dropped,
//! so a container swapped out of shared state can be put back on any
//! early return (including `?`). Calling [`ScopeGuard::dismiss`] disarms
//! the guard and returns the value.

use std::ops::{Deref, DerefMut};

/// Runs `on_exit(value)` when dropped, unless dismissed first.
pub struct ScopeGuard<T: Default, F: FnOnce(T)> {
    value: T,
    on_exit: Option<F>,
}

impl<T: Default, F: FnOnce(T)> ScopeGuard<T, F> {
    /// Arm a guard over `value`.
    pub fn new(value: T, on_exit: F) -> Self {
        Self {
            value,
            on_exit: Some(on_exit),
        }
    }

    /// Disarm the guard and take the value back.
    pub fn dismiss(mut self) -> T {
        self.on_exit = None;
        std::mem::take(&mut self.value)
    }
}

impl<T: Default, F: FnOnce(T)> Deref for ScopeGuard<T, F> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Default, F: FnOnce(T)> DerefMut for ScopeGuard<T, F> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Default, F: FnOnce(T)> Drop for ScopeGuard<T, F> {
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit(std::mem::take(&mut self.value));
        }
    }
}

/// Run `f` when the returned guard goes out of scope.
pub fn on_scope_exit<F: FnOnce()>(f: F) -> ScopeGuard<(), impl FnOnce(())> {
    ScopeGuard::new((), move |()| f())
}
