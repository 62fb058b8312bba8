use std::sync::Arc;

use tracing::info;

use crate::client::parse_data;
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::http::HttpRequest;
use crate::scope::TaskScope;
use crate::slot::{LoadMode, StateSlot};
use crate::transport::Transport;
use crate::types::{FederatedLoginRequest, LoginRequest, RegisterRequest, Session};

/// Sign-in state. A successful login, registration or federated login stores
/// the session on the shared `Gateway`, so every view model built on it
/// sends the bearer token from then on.
pub struct AuthViewModel<T> {
    gateway: Arc<Gateway<T>>,
    session: Arc<StateSlot<Session>>,
    scope: TaskScope,
}

impl<T: Transport + 'static> AuthViewModel<T> {
    pub fn new(gateway: Arc<Gateway<T>>) -> Self {
        Self {
            gateway,
            session: Arc::new(StateSlot::new("session")),
            scope: TaskScope::new(),
        }
    }

    pub fn session(&self) -> &StateSlot<Session> {
        &self.session
    }

    pub fn is_signed_in(&self) -> bool {
        self.gateway.session().is_some()
    }

    pub async fn settled(&self) {
        self.scope.settled().await;
    }

    pub fn login(&self, email: &str, password: &str) {
        let request = self.gateway.client().build_login(&login_request(email, password));
        self.spawn(request, "login");
    }

    pub async fn login_now(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let request = self.gateway.client().build_login(&login_request(email, password));
        self.sign_in_now(request, "login").await
    }

    pub fn register(&self, input: RegisterRequest) {
        let request = self.gateway.client().build_register(&input);
        self.spawn(request, "register");
    }

    pub async fn register_now(&self, input: RegisterRequest) -> Result<Session, ApiError> {
        let request = self.gateway.client().build_register(&input);
        self.sign_in_now(request, "register").await
    }

    /// Exchange an identity-provider token (e.g. Google) for a session.
    pub fn federated_login(&self, provider: &str, id_token: &str) {
        let request = self
            .gateway
            .client()
            .build_federated_login(&federated_request(provider, id_token));
        self.spawn(request, "federated login");
    }

    pub async fn federated_login_now(
        &self,
        provider: &str,
        id_token: &str,
    ) -> Result<Session, ApiError> {
        let request = self
            .gateway
            .client()
            .build_federated_login(&federated_request(provider, id_token));
        self.sign_in_now(request, "federated login").await
    }

    /// Forget the session locally. Any sign-in still in flight is abandoned:
    /// the reset orphans its ticket, so a late response is never stored.
    pub fn logout(&self) {
        self.scope.abort_all();
        self.session.reset();
        self.gateway.set_session(None);
        info!("signed out");
    }

    fn spawn(&self, request: Result<HttpRequest, ApiError>, operation: &'static str) {
        let ticket = self.session.begin(LoadMode::Fresh);
        let gateway = Arc::clone(&self.gateway);
        let slot = Arc::clone(&self.session);
        self.scope.spawn(async move {
            let _ = gateway
                .complete_then(
                    &slot,
                    ticket,
                    request,
                    |response| parse_data(operation, response),
                    |session| store_session(&gateway, session),
                )
                .await;
        });
    }

    async fn sign_in_now(
        &self,
        request: Result<HttpRequest, ApiError>,
        operation: &'static str,
    ) -> Result<Session, ApiError> {
        let ticket = self.session.begin(LoadMode::Fresh);
        self.gateway
            .complete_then(
                &self.session,
                ticket,
                request,
                |response| parse_data(operation, response),
                |session| store_session(&self.gateway, session),
            )
            .await
    }
}

fn store_session<T: Transport>(gateway: &Gateway<T>, session: &Session) {
    gateway.set_session(Some(session.clone()));
    info!(user = %session.user.email, admin = session.is_admin(), "signed in");
}

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.trim().to_string(),
        password: password.to_string(),
    }
}

fn federated_request(provider: &str, id_token: &str) -> FederatedLoginRequest {
    FederatedLoginRequest {
        provider: provider.to_string(),
        id_token: id_token.to_string(),
    }
}
