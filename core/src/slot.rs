//! Observable holder of one operation's current `Resource`.
//!
//! # Design
//! A slot publishes through two channels: a `watch` channel for "what is the
//! state now" and a `broadcast` channel that sees every transition in order.
//! Each `begin` bumps a generation counter; a `finish` carrying an older
//! ticket is discarded, so a slow superseded request can never overwrite the
//! state of a newer one. The counter check and the publication happen under
//! the same lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::error::ApiError;
use crate::resource::Resource;

const TRANSITION_BUFFER: usize = 64;

/// How `begin` seeds the loading state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// `Loading(None)`.
    Fresh,
    /// `Loading` carrying the slot's last payload, for pull-to-refresh.
    Refresh,
}

/// Identifies one invocation on a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

pub struct StateSlot<T> {
    name: &'static str,
    generation: Mutex<u64>,
    current: watch::Sender<Resource<T>>,
    transitions: broadcast::Sender<Resource<T>>,
}

impl<T: Clone> StateSlot<T> {
    /// A slot starting at `Idle`.
    pub fn new(name: &'static str) -> Self {
        let (current, _) = watch::channel(Resource::Idle);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            name,
            generation: Mutex::new(0),
            current,
            transitions,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> Resource<T> {
        self.current.borrow().clone()
    }

    /// Receiver for the latest value; intermediate values may be skipped.
    pub fn subscribe(&self) -> watch::Receiver<Resource<T>> {
        self.current.subscribe()
    }

    /// Receiver that observes every transition published after this call.
    pub fn transitions(&self) -> broadcast::Receiver<Resource<T>> {
        self.transitions.subscribe()
    }

    /// Start an invocation: publish `Loading` and return its ticket.
    pub fn begin(&self, mode: LoadMode) -> Ticket {
        let mut generation = self.lock();
        *generation += 1;
        let next = match mode {
            LoadMode::Fresh => Resource::loading(),
            LoadMode::Refresh => {
                let previous = self.current.borrow().data().cloned();
                Resource::refreshing(previous)
            }
        };
        self.publish(next);
        Ticket(*generation)
    }

    /// Publish the terminal state of `ticket`'s invocation. Returns `false`
    /// when a newer invocation (or a reset) superseded it.
    pub fn finish(&self, ticket: Ticket, outcome: Result<T, ApiError>) -> bool {
        self.finish_then(ticket, outcome, |_| {})
    }

    /// Like `finish`, but on success runs `commit` before publishing, under
    /// the generation lock. `commit` never runs for a superseded or reset
    /// invocation.
    pub fn finish_then<F>(&self, ticket: Ticket, outcome: Result<T, ApiError>, commit: F) -> bool
    where
        F: FnOnce(&T),
    {
        let generation = self.lock();
        if *generation != ticket.0 {
            debug!(slot = self.name, "discarding superseded result");
            return false;
        }
        let next = match outcome {
            Ok(data) => {
                commit(&data);
                Resource::Success(data)
            }
            Err(err) => {
                let stale = self.current.borrow().data().cloned();
                Resource::error_with(err.to_string(), stale)
            }
        };
        self.publish(next);
        true
    }

    /// Return to `Idle`, orphaning any invocation in flight.
    pub fn reset(&self) {
        let mut generation = self.lock();
        *generation += 1;
        self.publish(Resource::Idle);
    }

    fn publish(&self, next: Resource<T>) {
        self.current.send_replace(next.clone());
        // No live transition receivers is fine.
        let _ = self.transitions.send(next);
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
