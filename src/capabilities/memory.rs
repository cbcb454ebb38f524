//! In-memory/test-double implementations of the capability traits, plus
//! the `TracingEventService` this endpoint boots with by default. These
//! also let `main.rs` run end-to-end without a real user directory or
//! client registry wired up yet.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{claim_types, AuthenticateResult, ClaimsPrincipal, ExternalIdentity, SignInMessage};

use super::{AuthEvent, AuthScheme, ClientStore, EventService, HostAuthBridge, UserService};

/// A user record: the password to match and the principal to issue on
/// success. A set `partial_redirect` marks users whose login always
/// resumes elsewhere first; `claims` are merged into the issued principal
/// either way.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub password: String,
    pub claims: ClaimsPrincipal,
    pub partial_redirect: Option<String>,
}

#[derive(Default)]
pub struct InMemoryUserService {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl InMemoryUserService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, username: impl Into<String>, record: UserRecord) {
        self.users
            .lock()
            .expect("user map mutex poisoned")
            .insert(username.into(), record);
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn pre_authenticate(&self, _message: &SignInMessage) -> Option<AuthenticateResult> {
        // No existing-session shortcut in this in-memory default; every
        // flow falls through to the external/local-prompt decision.
        None
    }

    async fn authenticate_local(
        &self,
        username: &str,
        password: &str,
    ) -> Option<AuthenticateResult> {
        let users = self.users.lock().expect("user map mutex poisoned");
        let record = users.get(username)?;
        if record.password != password {
            return None;
        }

        if let Some(redirect) = &record.partial_redirect {
            return Some(AuthenticateResult::Partial {
                principal: record.claims.clone(),
                partial_sign_in_redirect_path: redirect.clone(),
            });
        }
        Some(AuthenticateResult::Full {
            principal: record.claims.clone(),
        })
    }

    async fn authenticate_external(&self, identity: &ExternalIdentity) -> Option<AuthenticateResult> {
        let mut principal = ClaimsPrincipal::new(identity.claims.clone());
        if !principal.has_claim_type(claim_types::IDENTITY_PROVIDER) {
            principal.add_claim(claim_types::IDENTITY_PROVIDER, &identity.provider, "self");
        }
        Some(AuthenticateResult::Full { principal })
    }
}

#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub display_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_providers: Vec<String>,
    pub local_login_allowed: bool,
}

impl Default for ClientRecord {
    fn default() -> Self {
        Self {
            display_name: None,
            redirect_uris: Vec::new(),
            allowed_providers: Vec::new(),
            local_login_allowed: true,
        }
    }
}

#[derive(Default)]
pub struct InMemoryClientStore {
    clients: Mutex<HashMap<String, ClientRecord>>,
}

impl InMemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&self, client_id: impl Into<String>, record: ClientRecord) {
        self.clients
            .lock()
            .expect("client map mutex poisoned")
            .insert(client_id.into(), record);
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn client_exists(&self, client_id: &str) -> bool {
        self.clients
            .lock()
            .expect("client map mutex poisoned")
            .contains_key(client_id)
    }

    async fn is_redirect_uri_allowed(&self, client_id: &str, return_url: &str) -> bool {
        self.clients
            .lock()
            .expect("client map mutex poisoned")
            .get(client_id)
            .map(|c| c.redirect_uris.iter().any(|u| u == return_url))
            .unwrap_or(false)
    }

    async fn is_identity_provider_allowed(&self, client_id: &str, provider: &str) -> bool {
        self.clients
            .lock()
            .expect("client map mutex poisoned")
            .get(client_id)
            .map(|c| c.allowed_providers.iter().any(|p| p == provider))
            .unwrap_or(false)
    }

    async fn allows_local_login(&self, client_id: &str) -> bool {
        self.clients
            .lock()
            .expect("client map mutex poisoned")
            .get(client_id)
            .map(|c| c.local_login_allowed)
            .unwrap_or(true)
    }

    async fn eligible_providers(&self, client_id: &str) -> Vec<String> {
        self.clients
            .lock()
            .expect("client map mutex poisoned")
            .get(client_id)
            .map(|c| c.allowed_providers.clone())
            .unwrap_or_default()
    }

    async fn display_name(&self, client_id: &str) -> Option<String> {
        self.clients
            .lock()
            .expect("client map mutex poisoned")
            .get(client_id)
            .and_then(|c| c.display_name.clone())
    }
}

/// Default `EventService`: every event becomes one structured `tracing`
/// event, named after its variant, never carrying raw passwords.
#[derive(Default)]
pub struct TracingEventService;

impl TracingEventService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventService for TracingEventService {
    async fn record(&self, event: AuthEvent) {
        match event {
            AuthEvent::PreLoginSuccess { username } => {
                tracing::info!(event = "pre_login_success", %username)
            }
            AuthEvent::PreLoginFailure { username } => {
                tracing::warn!(event = "pre_login_failure", %username)
            }
            AuthEvent::LocalLoginSuccess { subject } => {
                tracing::info!(event = "local_login_success", %subject)
            }
            AuthEvent::LocalLoginFailure { username, reason } => {
                tracing::warn!(event = "local_login_failure", %username, %reason)
            }
            AuthEvent::ExternalLoginSuccess { provider, subject } => {
                tracing::info!(event = "external_login_success", %provider, %subject)
            }
            AuthEvent::ExternalLoginFailure { provider, reason } => {
                tracing::warn!(event = "external_login_failure", %provider, %reason)
            }
            AuthEvent::ExternalLoginError { provider, error } => {
                tracing::error!(event = "external_login_error", %provider, %error)
            }
            AuthEvent::PartialLoginComplete { subject } => {
                tracing::info!(event = "partial_login_complete", %subject)
            }
            AuthEvent::Logout { subject } => {
                tracing::info!(event = "logout", subject = subject.as_deref().unwrap_or("-"))
            }
            AuthEvent::EndpointFailure { endpoint, error } => {
                tracing::error!(event = "endpoint_failure", %endpoint, %error)
            }
        }
    }
}

/// Test-double `EventService` that captures every event for assertions.
#[derive(Default)]
pub struct RecordingEventService {
    events: Mutex<Vec<AuthEvent>>,
}

impl RecordingEventService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().expect("event log mutex poisoned").clone()
    }
}

#[async_trait]
impl EventService for RecordingEventService {
    async fn record(&self, event: AuthEvent) {
        self.events.lock().expect("event log mutex poisoned").push(event);
    }
}

/// In-memory `HostAuthBridge`. Real session issuance is a random id kept
/// in a map; external challenges are resolved against identities seeded
/// up front, standing in for a provider round trip in tests and in the
/// default boot configuration.
#[derive(Default)]
pub struct InMemoryHostAuthBridge {
    sessions: Mutex<HashMap<String, ClaimsPrincipal>>,
    external_identities: Mutex<HashMap<String, ExternalIdentity>>,
}

impl InMemoryHostAuthBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the identity a future `complete_challenge(provider, code, ..)`
    /// call for this `code` should resolve to.
    pub fn seed_external_identity(&self, code: impl Into<String>, identity: ExternalIdentity) {
        self.external_identities
            .lock()
            .expect("identity map mutex poisoned")
            .insert(code.into(), identity);
    }

    pub fn active_session(&self, session_id: &str) -> Option<ClaimsPrincipal> {
        self.sessions
            .lock()
            .expect("session map mutex poisoned")
            .get(session_id)
            .cloned()
    }
}

#[async_trait]
impl HostAuthBridge for InMemoryHostAuthBridge {
    async fn sign_in(&self, principal: &ClaimsPrincipal, _scheme: AuthScheme) -> String {
        let session_id: String =
            std::iter::repeat_with(fastrand::alphanumeric).take(24).collect();
        self.sessions
            .lock()
            .expect("session map mutex poisoned")
            .insert(session_id.clone(), principal.clone());
        session_id
    }

    async fn sign_out(&self, session_id: &str) {
        self.sessions
            .lock()
            .expect("session map mutex poisoned")
            .remove(session_id);
    }

    fn supports_provider(&self, provider: &str) -> bool {
        // The in-memory bridge is seeded per test/deployment rather than
        // per provider, so any non-empty provider name is "configured".
        !provider.is_empty()
    }

    fn challenge_url(&self, provider: &str, state: &str, redirect_uri: &str) -> anyhow::Result<String> {
        Ok(format!(
            "/test-provider/{provider}/authorize?state={state}&redirect_uri={redirect_uri}"
        ))
    }

    async fn complete_challenge(
        &self,
        _provider: &str,
        code: &str,
        _redirect_uri: &str,
    ) -> anyhow::Result<ExternalIdentity> {
        self.external_identities
            .lock()
            .expect("identity map mutex poisoned")
            .get(code)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown external authorization code"))
    }

    async fn current_principal(&self, session_id: &str) -> Option<ClaimsPrincipal> {
        self.active_session(session_id)
    }
}
