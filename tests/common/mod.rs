//! Shared stand-ins for a callback-style primitive under test

use std::time::{Duration, Instant};

use cotest::prelude::*;

/// An operation that resolves with `value` after `delay`
pub fn resolve_after<V: 'static>(delay: Duration, value: V) -> AsyncOperation<V> {
    AsyncOperation::call(move |ev, complete| {
        ev.add_timeout(Instant::now() + delay, move |ev| {
            complete(ev, Completion::resolved(Some(value)))
        });
    })
}

/// An operation that fails with `err` after `delay`
pub fn fail_after<V: 'static>(delay: Duration, err: OperationError) -> AsyncOperation<V> {
    AsyncOperation::call(move |ev, complete| {
        ev.add_timeout(Instant::now() + delay, move |ev| {
            complete(ev, Completion::raised(err))
        });
    })
}

/// An operation that resolves on the next loop iteration
pub fn resolve_now<V: 'static>(value: V) -> AsyncOperation<V> {
    AsyncOperation::call(move |ev, complete| {
        ev.add_callback(move |ev| complete(ev, Completion::resolved(Some(value))));
    })
}

/// An operation whose completion never fires
pub fn never<V: 'static>() -> AsyncOperation<V> {
    AsyncOperation::call(|_, _complete| {})
}
