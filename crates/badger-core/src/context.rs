//! Thread-local diagnostic context.
//!
//! Key/value pairs describing what the current thread is doing (request id,
//! tenant, job name). [`ErrorEvent::new`](crate::ErrorEvent::new) takes a
//! snapshot synchronously on the reporting thread, so the values that end up
//! in a notice never depend on which worker later serializes it.
//!
//! Async tasks can migrate between threads at `.await` points. Set context
//! and create the event without awaiting in between, or pass the values to
//! [`ErrorEvent::with_context`](crate::ErrorEvent::with_context) directly.

use std::{cell::RefCell, collections::BTreeMap};

thread_local! {
    static CONTEXT: RefCell<BTreeMap<String, String>> = const { RefCell::new(BTreeMap::new()) };
}

/// Sets `key` to `value` for the current thread.
pub fn insert(key: impl Into<String>, value: impl Into<String>) {
    CONTEXT.with(|context| {
        context.borrow_mut().insert(key.into(), value.into());
    });
}

/// Removes `key` from the current thread's context.
pub fn remove(key: &str) -> Option<String> {
    CONTEXT.with(|context| context.borrow_mut().remove(key))
}

/// Clears the current thread's context.
pub fn clear() {
    CONTEXT.with(|context| context.borrow_mut().clear());
}

/// Copy of the current thread's context.
pub fn snapshot() -> BTreeMap<String, String> {
    CONTEXT.with(|context| context.borrow().clone())
}

/// Sets `key` until the returned guard is dropped, restoring any previous
/// value.
pub fn scoped(key: impl Into<String>, value: impl Into<String>) -> ContextGuard {
    let key = key.into();
    let previous = CONTEXT.with(|context| context.borrow_mut().insert(key.clone(), value.into()));
    ContextGuard { key, previous }
}

/// Restores a context entry on drop.
#[derive(Debug)]
#[must_use = "the context entry is removed as soon as the guard is dropped"]
pub struct ContextGuard {
    key: String,
    previous: Option<String>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let key = std::mem::take(&mut self.key);
        let previous = self.previous.take();
        CONTEXT.with(|context| {
            let mut context = context.borrow_mut();
            match previous {
                Some(value) => context.insert(key, value),
                None => context.remove(&key),
            };
        });
    }
}
