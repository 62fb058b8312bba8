//! Lifetime scoping and ordering for the tasks a view model launches.
//!
//! `TaskScope` ties spawned operations to their owner: dropping the scope
//! aborts whatever is still in flight. `SerialGate` hands out turns in call
//! order so mutations on one resource never overlap.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::task::JoinSet;

/// Owns spawned tasks; dropping it aborts them.
#[derive(Default)]
pub struct TaskScope {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` onto the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    pub fn abort_all(&self) {
        self.lock().abort_all();
    }

    /// Wait until every task has finished, including tasks spawned while
    /// waiting.
    pub async fn settled(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                return;
            }
            while batch.join_next().await.is_some() {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO turnstile: turns are granted in `reserve` order.
#[derive(Default)]
pub struct SerialGate {
    tail: Mutex<Option<oneshot::Receiver<()>>>,
}

/// A reserved place in a `SerialGate` queue.
pub struct GatePass {
    previous: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

/// Held while a turn runs; dropping it lets the next pass in.
pub struct GateTurn {
    _done: oneshot::Sender<()>,
}

impl SerialGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&self) -> GatePass {
        let (done, next) = oneshot::channel();
        let previous = self
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(next);
        GatePass { previous, done }
    }
}

impl GatePass {
    /// Wait for every earlier pass to finish (or be dropped).
    pub async fn enter(self) -> GateTurn {
        if let Some(previous) = self.previous {
            // Err just means the earlier holder was dropped without sending.
            let _ = previous.await;
        }
        GateTurn { _done: self.done }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn settled_waits_for_follow_up_tasks() {
        let scope = Arc::new(TaskScope::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let follow_scope = Arc::downgrade(&scope);
        let follow_log = Arc::clone(&log);
        scope.spawn(async move {
            follow_log.lock().unwrap().push("first");
            if let Some(scope) = follow_scope.upgrade() {
                let log = Arc::clone(&follow_log);
                scope.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    log.lock().unwrap().push("second");
                });
            }
        });

        scope.settled().await;
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn dropping_scope_aborts_tasks() {
        let (tx, rx) = oneshot::channel::<()>();
        let scope = TaskScope::new();
        scope.spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = tx.send(());
        });
        drop(scope);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn gate_grants_turns_in_reserve_order() {
        let gate = SerialGate::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let scope = TaskScope::new();

        for (index, delay) in [(0u32, 30u64), (1, 0), (2, 10)] {
            let pass = gate.reserve();
            let log = Arc::clone(&log);
            scope.spawn(async move {
                let _turn = pass.enter().await;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().unwrap().push(index);
            });
        }

        scope.settled().await;
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dropped_pass_does_not_block_queue() {
        let gate = SerialGate::new();
        let first = gate.reserve();
        let second = gate.reserve();
        drop(first);
        let _turn = tokio::time::timeout(Duration::from_secs(1), second.enter())
            .await
            .expect("second pass should not wait on a dropped one");
    }
}
