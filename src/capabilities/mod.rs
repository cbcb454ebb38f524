//! Capability traits the flow controller depends on.
//!
//! Each trait is a narrow async seam between the state machine in
//! `crate::flow` and whatever backs it in a real deployment: a user store,
//! a client/relying-party registry, an audit sink, a host's own session
//! bridge, and the HTML rendering layer. The controller only ever sees
//! `Arc<dyn Trait>`, so a deployment can swap any one of these without
//! touching the flow logic, and tests can swap all of them for in-memory
//! doubles.

pub mod memory;
pub mod oidc;

use async_trait::async_trait;

use crate::domain::{AuthenticateResult, ClaimsPrincipal, ExternalIdentity, SignInMessage};

/// Validates local credentials and resolves partial-login resumption.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Opportunistic pre-authenticate against an existing host session,
    /// before any prompt is rendered. `None` means there is no shortcut and
    /// the controller should fall through to the external/local-prompt
    /// decision.
    async fn pre_authenticate(&self, message: &SignInMessage) -> Option<AuthenticateResult>;

    /// Validate a username/password pair. Returns `None` when the
    /// credentials are rejected outright.
    async fn authenticate_local(
        &self,
        username: &str,
        password: &str,
    ) -> Option<AuthenticateResult>;

    /// Resolve a federated identity into a result, used right after an
    /// external provider's callback completes. `None` mirrors
    /// `authenticate_local`'s "credentials rejected outright" case.
    async fn authenticate_external(&self, identity: &ExternalIdentity) -> Option<AuthenticateResult>;
}

/// Known OAuth2/OIDC clients (relying parties) this endpoint serves.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Whether `client_id` is registered at all. Checked as soon as a flow
    /// starts so an unknown client never reaches the login prompt.
    async fn client_exists(&self, client_id: &str) -> bool;

    /// Whether `return_url` is an allowed redirect target for `client_id`.
    async fn is_redirect_uri_allowed(&self, client_id: &str, return_url: &str) -> bool;

    /// Whether `provider` is on this client's external-identity-provider
    /// whitelist.
    async fn is_identity_provider_allowed(&self, client_id: &str, provider: &str) -> bool;

    /// Whether this client permits the local-login form at all. The caller
    /// still AND-s this with the server-wide `enable_local_login` setting.
    async fn allows_local_login(&self, client_id: &str) -> bool;

    /// The client's full external-provider whitelist, used to assemble the
    /// login page's provider links. The caller still filters this against
    /// the host bridge's configured schemes.
    async fn eligible_providers(&self, client_id: &str) -> Vec<String>;

    /// Display name shown on the login/logout prompts, if the client has one.
    async fn display_name(&self, client_id: &str) -> Option<String>;
}

/// Non-blocking audit trail. A failure to record an event never fails the
/// request it describes.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    PreLoginSuccess { username: String },
    PreLoginFailure { username: String },
    LocalLoginSuccess { subject: String },
    LocalLoginFailure { username: String, reason: String },
    ExternalLoginSuccess { provider: String, subject: String },
    ExternalLoginFailure { provider: String, reason: String },
    ExternalLoginError { provider: String, error: String },
    PartialLoginComplete { subject: String },
    Logout { subject: Option<String> },
    EndpointFailure { endpoint: String, error: String },
}

#[async_trait]
pub trait EventService: Send + Sync {
    async fn record(&self, event: AuthEvent);
}

/// Which of the three authentication schemes a principal was issued under.
/// Carried alongside a principal so the controller knows which cookie(s)
/// to clear on the next leg of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Primary,
    External,
    Partial,
}

/// The host's own session bridge: the thing that actually issues the
/// browser-facing authentication cookie/session and that starts and
/// completes a round trip to an external identity provider. Kept as a
/// capability trait rather than tied to one SDK, so a deployment backed by
/// an OIDC upstream and one backed by SAML can both implement it.
#[async_trait]
pub trait HostAuthBridge: Send + Sync {
    /// Issue a browser session for `principal` under `scheme`, returning an
    /// opaque session id for bookkeeping (event logging, `GET /healthz`
    /// introspection, etc).
    async fn sign_in(&self, principal: &ClaimsPrincipal, scheme: AuthScheme) -> String;

    /// Clear whatever session state `sign_in` established.
    async fn sign_out(&self, session_id: &str);

    /// Whether `provider` is a scheme this host is configured to challenge.
    fn supports_provider(&self, provider: &str) -> bool;

    /// Build the URL that starts a challenge against an external provider.
    fn challenge_url(&self, provider: &str, state: &str, redirect_uri: &str) -> anyhow::Result<String>;

    /// Complete an external provider's callback, producing the identity it
    /// asserted.
    async fn complete_challenge(
        &self,
        provider: &str,
        code: &str,
        redirect_uri: &str,
    ) -> anyhow::Result<ExternalIdentity>;

    /// Look up the principal behind a previously issued session id, used by
    /// the logout prompt to decide whether the caller is authenticated at
    /// all, and to read its `idp` claim for cross-provider sign-out.
    async fn current_principal(&self, session_id: &str) -> Option<ClaimsPrincipal>;
}
