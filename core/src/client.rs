//! Stateless HTTP request builder and response parser for the VetCare API.
//!
//! # Design
//! `VetCareClient` holds only a `base_url` and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a parse step that consumes an
//! `HttpResponse`. CRUD collections share one set of generic builders keyed
//! by `CrudResource`, and every response goes through the same envelope
//! classification in `parse_data` / `parse_ack`.

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    Appointment, AppointmentStatus, CreateOrder, CrudResource, Envelope, FederatedLoginRequest,
    LoginRequest, RegisterRequest, StatusChange,
};

/// Payload of acknowledgement-only responses when the server sends no message.
pub const DEFAULT_ACK: &str = "ok";

/// Synchronous, stateless client for the VetCare API.
#[derive(Debug, Clone)]
pub struct VetCareClient {
    base_url: String,
}

impl VetCareClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- authentication ----------------------------------------------------

    pub fn build_login(&self, input: &LoginRequest) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/auth/login", input)
    }

    pub fn build_register(&self, input: &RegisterRequest) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/auth/register", input)
    }

    pub fn build_federated_login(
        &self,
        input: &FederatedLoginRequest,
    ) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/auth/federated", input)
    }

    // -- CRUD collections --------------------------------------------------

    pub fn build_list<R: CrudResource>(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, &format!("/{}", R::COLLECTION))
    }

    pub fn build_get<R: CrudResource>(&self, id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Get, &item_path::<R>(id))
    }

    pub fn build_create<R: CrudResource>(&self, input: &R::Create) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, &format!("/{}", R::COLLECTION), input)
    }

    pub fn build_update<R: CrudResource>(
        &self,
        id: Uuid,
        input: &R::Update,
    ) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Put, &item_path::<R>(id), input)
    }

    pub fn build_delete<R: CrudResource>(&self, id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Delete, &item_path::<R>(id))
    }

    // -- appointments ------------------------------------------------------

    pub fn build_change_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<HttpRequest, ApiError> {
        self.json(
            HttpMethod::Patch,
            &format!("{}/status", item_path::<Appointment>(id)),
            &StatusChange { status },
        )
    }

    pub fn build_cancel_appointment(&self, id: Uuid) -> HttpRequest {
        self.bare(
            HttpMethod::Post,
            &format!("{}/cancel", item_path::<Appointment>(id)),
        )
    }

    // -- orders ------------------------------------------------------------

    pub fn build_checkout(&self, input: &CreateOrder) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/orders", input)
    }

    pub fn build_list_orders(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/orders")
    }

    fn bare(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers: Vec::new(),
            body: None,
        }
    }

    fn json<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        input: &B,
    ) -> Result<HttpRequest, ApiError> {
        let body =
            serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        })
    }
}

fn item_path<R: CrudResource>(id: Uuid) -> String {
    format!("/{}/{id}", R::COLLECTION)
}

/// Parse a response whose envelope must carry a `data` payload.
pub fn parse_data<T: DeserializeOwned>(
    operation: &'static str,
    response: HttpResponse,
) -> Result<T, ApiError> {
    parse_envelope::<T>(operation, response)?
        .data
        .ok_or(ApiError::EmptyResponse { operation })
}

/// Parse an acknowledgement response. The payload is the server's message.
pub fn parse_ack(operation: &'static str, response: HttpResponse) -> Result<String, ApiError> {
    let envelope = parse_envelope::<serde_json::Value>(operation, response)?;
    Ok(envelope
        .message
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ACK.to_string()))
}

fn parse_envelope<T: DeserializeOwned>(
    operation: &'static str,
    response: HttpResponse,
) -> Result<Envelope<T>, ApiError> {
    check_status(&response)?;
    let body = response.body.trim();
    if body.is_empty() || body == "null" {
        return Err(ApiError::EmptyResponse { operation });
    }
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| ApiError::Deserialization(e.to_string()))?;
    if !envelope.success {
        return Err(ApiError::rejected(envelope.message));
    }
    Ok(envelope)
}

/// Map non-2xx status codes to the matching `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    let message = server_message(&response.body)
        .unwrap_or_else(|| format!("request failed with status {}", response.status));
    if response.status == 404 {
        return Err(ApiError::NotFound { message });
    }
    Err(ApiError::Http {
        status: response.status,
        message,
    })
}

/// The envelope's message when the body is one, else the raw body text.
fn server_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Envelope<serde_json::Value>>(body) {
        Ok(envelope) => envelope.message.filter(|message| !message.trim().is_empty()),
        Err(_) => Some(body.to_string()),
    }
}
