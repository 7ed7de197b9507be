use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// Shared mutable holder returned by `use_ref` and used as a node ref target.
///
/// Clones share the same cell; equality is identity.
pub struct MutableRef<T> {
    inner: Rc<RefCell<T>>,
}

impl<T> Clone for MutableRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> MutableRef<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(value)),
        }
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    pub fn set(&self, value: T) -> T {
        std::mem::replace(&mut *self.inner.borrow_mut(), value)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> MutableRef<T> {
    /// Snapshot of the held value.
    pub fn current(&self) -> T {
        self.inner.borrow().clone()
    }
}

impl<T> PartialEq for MutableRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutableRef").field(&*self.inner.borrow()).finish()
    }
}
