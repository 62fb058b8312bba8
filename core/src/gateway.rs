//! The one place where an operation turns into `Resource` transitions.
//!
//! # Design
//! `Gateway::run` publishes `Loading`, performs exactly one request through
//! the `Transport`, classifies the outcome and publishes exactly one terminal
//! state. Every failure category (build error, transport failure, bad status,
//! empty or rejected envelope, and panics inside transport or parser) ends
//! as `Resource::Error`. Nothing propagates to the caller as a fault.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{PoisonError, RwLock};

use futures::FutureExt;
use tracing::{debug, warn};

use crate::client::VetCareClient;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::slot::{LoadMode, StateSlot, Ticket};
use crate::transport::Transport;
use crate::types::Session;

/// Shared by every view model of one signed-in client.
pub struct Gateway<T> {
    client: VetCareClient,
    transport: T,
    session: RwLock<Option<Session>>,
}

impl<T: Transport> Gateway<T> {
    pub fn new(client: VetCareClient, transport: T) -> Self {
        Self {
            client,
            transport,
            session: RwLock::new(None),
        }
    }

    pub fn client(&self) -> &VetCareClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.token.clone())
    }

    /// Begin an invocation on `slot` and drive it to its terminal state.
    pub async fn run<R, F>(
        &self,
        slot: &StateSlot<R>,
        mode: LoadMode,
        request: Result<HttpRequest, ApiError>,
        parse: F,
    ) -> Result<R, ApiError>
    where
        R: Clone,
        F: FnOnce(HttpResponse) -> Result<R, ApiError>,
    {
        let ticket = slot.begin(mode);
        self.complete(slot, ticket, request, parse).await
    }

    /// Drive an invocation whose `Loading` state was already published by
    /// `slot.begin`. Used by triggers that publish synchronously and finish
    /// in a spawned task.
    pub async fn complete<R, F>(
        &self,
        slot: &StateSlot<R>,
        ticket: Ticket,
        request: Result<HttpRequest, ApiError>,
        parse: F,
    ) -> Result<R, ApiError>
    where
        R: Clone,
        F: FnOnce(HttpResponse) -> Result<R, ApiError>,
    {
        self.complete_then(slot, ticket, request, parse, |_| {}).await
    }

    /// `complete` with a side effect that must only land while `ticket` is
    /// still current, such as storing a session. `parse` stays pure; `commit`
    /// runs under the slot's generation lock right before `Success` is
    /// published.
    pub async fn complete_then<R, F, C>(
        &self,
        slot: &StateSlot<R>,
        ticket: Ticket,
        request: Result<HttpRequest, ApiError>,
        parse: F,
        commit: C,
    ) -> Result<R, ApiError>
    where
        R: Clone,
        F: FnOnce(HttpResponse) -> Result<R, ApiError>,
        C: FnOnce(&R),
    {
        debug!(slot = slot.name(), "operation started");
        let outcome = self.perform(request, parse).await;
        if let Err(err) = &outcome {
            warn!(slot = slot.name(), error = %err, "operation failed");
        }
        slot.finish_then(ticket, outcome.clone(), commit);
        outcome
    }

    async fn perform<R, F>(
        &self,
        request: Result<HttpRequest, ApiError>,
        parse: F,
    ) -> Result<R, ApiError>
    where
        F: FnOnce(HttpResponse) -> Result<R, ApiError>,
    {
        let mut request = request?;
        if request.header("authorization").is_none() {
            if let Some(token) = self.token() {
                request = request.with_bearer(&token);
            }
        }
        let response = AssertUnwindSafe(self.transport.execute(request))
            .catch_unwind()
            .await
            .map_err(panic_error)??;
        panic::catch_unwind(AssertUnwindSafe(|| parse(response))).map_err(panic_error)?
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> ApiError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "operation panicked".to_string());
    ApiError::Unexpected(message)
}
