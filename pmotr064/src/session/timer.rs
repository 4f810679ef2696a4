//! Cancelable recurring tasks.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Holds at most one running recurring task.
///
/// Rescheduling always aborts the previous task before spawning the new one,
/// so two instances of the same task never overlap.
#[derive(Debug)]
pub struct TaskSlot {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// Run `job` now and then `interval` after each completion, until it
    /// returns `ControlFlow::Break` or the slot is canceled.
    pub fn reschedule<F, Fut>(&self, runtime: &Handle, interval: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let name = self.name;
        trace!("Scheduling {} every {:?}", name, interval);
        *slot = Some(runtime.spawn(async move {
            loop {
                if job().await.is_break() {
                    trace!("Task {} finished", name);
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        }));
    }

    /// Abort the running task, if any.
    pub fn cancel(&self) {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            trace!("Canceling {}", self.name);
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
