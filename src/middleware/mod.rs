//! Middleware that sees every update before it is committed.
//!
//! Each step receives the candidate state and answers with a [`Flow`]:
//! pass it on (possibly transformed), halt it silently, or abort it with a
//! reason. Plain closures `Fn(T) -> Flow<T>` are middleware; implement
//! [`Middleware`] directly for steps that need to await something.

mod pipeline;

pub use pipeline::Pipeline;

use async_trait::async_trait;
use std::fmt::Debug;

/// Outcome of one middleware step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow<T> {
    /// Hand this value to the next step, or commit it if this was the last.
    Continue(T),
    /// Drop the update. Nothing is committed and nobody is notified.
    Halt,
    /// Drop the update and report `reason` to the caller of `set`.
    Abort(String),
}

/// A step in the update pipeline.
#[async_trait]
pub trait Middleware<T: Send + 'static>: Send + Sync {
    async fn handle(&self, state: T) -> Flow<T>;
}

#[async_trait]
impl<T, F> Middleware<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> Flow<T> + Send + Sync,
{
    async fn handle(&self, state: T) -> Flow<T> {
        self(state)
    }
}

/// Log every candidate state at debug level and pass it on unchanged.
pub fn logger<T>() -> impl Middleware<T>
where
    T: Debug + Send + 'static,
{
    |state: T| {
        tracing::debug!(?state, "candidate state");
        Flow::Continue(state)
    }
}

/// Halt any update whose candidate fails `predicate`.
pub fn filter<T, P>(predicate: P) -> impl Middleware<T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    move |state: T| {
        if predicate(&state) {
            Flow::Continue(state)
        } else {
            Flow::Halt
        }
    }
}

/// Transform every candidate with `f`.
pub fn map<T, F>(f: F) -> impl Middleware<T>
where
    T: Send + 'static,
    F: Fn(T) -> T + Send + Sync + 'static,
{
    move |state: T| Flow::Continue(f(state))
}
