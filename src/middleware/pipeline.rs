use super::{Flow, Middleware};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An ordered chain of middleware steps.
///
/// Cloning is cheap: steps are shared, so a store can take a snapshot of its
/// pipeline when an update starts and keep registering new steps meanwhile.
pub struct Pipeline<T: Send + 'static> {
    steps: Vec<Arc<dyn Middleware<T>>>,
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step. It runs after every step already registered.
    pub fn push<M>(&mut self, step: M)
    where
        M: Middleware<T> + 'static,
    {
        self.steps.push(Arc::new(step));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Walk the steps in order, feeding each one the previous step's output.
    ///
    /// Returns `Flow::Continue` with the final candidate when every step passed
    /// it on, or the first `Halt`/`Abort` encountered. An empty pipeline passes
    /// `initial` through unchanged. A step that never resolves stalls the walk.
    pub async fn run(&self, initial: T) -> Flow<T> {
        let mut candidate = initial;

        for (index, step) in self.steps.iter().enumerate() {
            match step.handle(candidate).await {
                Flow::Continue(next) => candidate = next,
                Flow::Halt => {
                    debug!(step = index, "update halted by middleware");
                    return Flow::Halt;
                }
                Flow::Abort(reason) => {
                    debug!(step = index, %reason, "update aborted by middleware");
                    return Flow::Abort(reason);
                }
            }
        }

        Flow::Continue(candidate)
    }
}

impl<T: Send + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}
