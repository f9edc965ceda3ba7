//! A lazily initialised single-writer cell.
//!
//! The cell associates a key (held by its owner) with a value that is created
//! exactly once. The creation protocol is observable: while one caller is
//! creating the value, other callers see [`CreationState::Creating`] and can
//! back off instead of blocking. This is what prevents re-entrant deadlocks
//! when module creation recurses into itself through a cyclic import.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// The result of [`CreationRef::try_begin`].
pub enum CreationState<'a, T> {
    /// The value is already created.
    Ready(&'a T),
    /// The caller won the race and must finish via [`CreationGuard`].
    Created(CreationGuard<'a, T>),
    /// Another caller is creating the value right now.
    Creating,
}

/// A single-initializer cell with a non-blocking re-entrant read.
pub struct CreationRef<T> {
    creating: AtomicBool,
    cell: OnceLock<T>,
}

impl<T> Default for CreationRef<T> {
    fn default() -> Self {
        Self {
            creating: AtomicBool::new(false),
            cell: OnceLock::new(),
        }
    }
}

impl<T> CreationRef<T> {
    /// Gets the value if it has been created. Never blocks.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Attempts to become the creator of the value.
    ///
    /// At most one caller at a time receives [`CreationState::Created`]; the
    /// returned guard must be completed (or dropped to release the creation
    /// right). Once completed, the reference is final.
    pub fn try_begin(&self) -> CreationState<'_, T> {
        if let Some(value) = self.cell.get() {
            return CreationState::Ready(value);
        }
        if self.creating.swap(true, Ordering::AcqRel) {
            return CreationState::Creating;
        }
        // Re-check: the previous creator may have completed between the
        // `get` and the flag swap.
        if let Some(value) = self.cell.get() {
            self.creating.store(false, Ordering::Release);
            return CreationState::Ready(value);
        }
        CreationState::Created(CreationGuard {
            cell: self,
            done: false,
        })
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CreationRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreationRef")
            .field("creating", &self.creating.load(Ordering::Relaxed))
            .field("value", &self.cell.get())
            .finish()
    }
}

/// The creation right handed to the winning caller.
pub struct CreationGuard<'a, T> {
    cell: &'a CreationRef<T>,
    done: bool,
}

impl<'a, T> CreationGuard<'a, T> {
    /// Stores the created value and releases the creation flag.
    pub fn complete(mut self, value: T) -> &'a T {
        let cell = self.cell;
        let _ = cell.cell.set(value);
        self.done = true;
        cell.creating.store(false, Ordering::Release);
        cell.cell.get().unwrap()
    }
}

impl<T> Drop for CreationGuard<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            // Creation was abandoned; let a later caller retry.
            self.cell.creating.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_initialization() {
        let cell = CreationRef::<u32>::default();
        assert!(cell.get().is_none());

        let CreationState::Created(guard) = cell.try_begin() else {
            panic!("first caller must win the creation right");
        };
        // a re-entrant caller observes the in-flight creation
        assert!(matches!(cell.try_begin(), CreationState::Creating));

        assert_eq!(*guard.complete(7), 7);
        assert!(matches!(cell.try_begin(), CreationState::Ready(&7)));
        assert_eq!(cell.get(), Some(&7));
    }

    #[test]
    fn test_abandoned_creation_can_retry() {
        let cell = CreationRef::<u32>::default();
        match cell.try_begin() {
            CreationState::Created(guard) => drop(guard),
            _ => panic!("expected creation right"),
        }
        assert!(matches!(cell.try_begin(), CreationState::Created(_)));
    }
}
