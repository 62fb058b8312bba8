//! Client core for the VetCare veterinary-care app.
//!
//! # Overview
//! Every operation a screen triggers (sign-in, pets, appointments, clinic
//! directory, store) is exposed as a `Resource<T>` published on a
//! `StateSlot`: `Idle`, then `Loading`, then exactly one of `Success` or
//! `Error`. Screens render by matching on the current value.
//!
//! # Design
//! - `VetCareClient` is stateless and only builds `HttpRequest` values and
//!   parses `HttpResponse` values. Hosts with their own HTTP stack can use it
//!   directly (host-does-IO).
//! - `Gateway` is the single generic producer. It runs one request through a
//!   `Transport`, classifies the outcome and publishes the terminal state.
//!   All entity-specific code is a `CrudResource` impl plus a parse label.
//! - View models own their slots and a `TaskScope`. Dropping a view model
//!   aborts its in-flight work.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod resource;
pub mod schedule;
pub mod scope;
pub mod slot;
pub mod transport;
pub mod types;
pub mod viewmodel;

pub use client::VetCareClient;
pub use config::{ClientConfig, ConfigError};
pub use error::ApiError;
pub use gateway::Gateway;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use resource::Resource;
pub use schedule::{ScheduleError, ScheduleSelection};
pub use scope::TaskScope;
pub use slot::{LoadMode, StateSlot};
pub use transport::{ReqwestTransport, Transport};
pub use viewmodel::{
    AppointmentsViewModel, AuthViewModel, Cart, CartLine, CheckoutViewModel, ClinicsViewModel,
    CrudViewModel, PetsViewModel, ProductsViewModel,
};

use std::sync::Arc;

/// Build a gateway over `ReqwestTransport` from `config`.
///
/// # Errors
///
/// Returns `ApiError::Transport` when the HTTP client cannot be built.
pub fn connect(config: &ClientConfig) -> Result<Arc<Gateway<ReqwestTransport>>, ApiError> {
    let transport = ReqwestTransport::new(config)?;
    Ok(Arc::new(Gateway::new(
        VetCareClient::new(&config.base_url),
        transport,
    )))
}
