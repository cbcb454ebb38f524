//! Core data model for the interactive authentication endpoint.
//!
//! `SignInMessage` / `SignOutMessage` describe an in-progress request handed
//! down from the protocol layer; `AuthenticateResult` is the polymorphic
//! value the user service hands back; `ClaimsPrincipal` is the identity the
//! controller mutates while driving a flow to completion.

use serde::{Deserialize, Serialize};

/// Request handed down by the authorize endpoint, immutable for the life of
/// a flow. Stored in a [`crate::cookies::MessageStore`] keyed by a random
/// `signInId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignInMessage {
    pub client_id: String,
    pub return_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr_values: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

/// Request handed down for a sign-out round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignOutMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

/// A single claim: type, value, and the issuer that asserted it.
///
/// The issuer matters for `ExternalProviderUserId` claims, where the
/// issuer names the external provider and the value is that provider's
/// subject id for the user (see [`claim_types::EXTERNAL_PROVIDER_USER_ID`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
    pub issuer: String,
}

impl Claim {
    pub fn new(
        claim_type: impl Into<String>,
        value: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            issuer: issuer.into(),
        }
    }
}

/// A mutable, exclusively-owned bag of claims. Produced outside the
/// controller (by the user service or an external identity provider),
/// mutated inside it, and handed back to the host bridge for issuance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimsPrincipal {
    pub claims: Vec<Claim>,
}

impl ClaimsPrincipal {
    pub fn new(claims: Vec<Claim>) -> Self {
        Self { claims }
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    pub fn has_claim_type(&self, claim_type: &str) -> bool {
        self.claims.iter().any(|c| c.claim_type == claim_type)
    }

    pub fn has_all_claim_types(&self, claim_types: &[&str]) -> bool {
        claim_types.iter().all(|t| self.has_claim_type(t))
    }

    pub fn add_claim(
        &mut self,
        claim_type: impl Into<String>,
        value: impl Into<String>,
        issuer: impl Into<String>,
    ) {
        self.claims.push(Claim::new(claim_type, value, issuer));
    }

    pub fn remove_claims(&mut self, claim_type: &str) {
        self.claims.retain(|c| c.claim_type != claim_type);
    }
}

/// The identity produced by a host bridge after an external IdP callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: String,
    pub provider_id: String,
    pub claims: Vec<Claim>,
}

impl ExternalIdentity {
    /// Reconstruct from a principal's claim set by locating the
    /// `ExternalProviderUserId` claim (used at resume and again when the
    /// external callback reduces a host-produced principal).
    pub fn from_principal(principal: &ClaimsPrincipal) -> Option<Self> {
        let claim = principal.find_first(claim_types::EXTERNAL_PROVIDER_USER_ID)?;
        Some(Self {
            provider: claim.issuer.clone(),
            provider_id: claim.value.clone(),
            claims: principal.claims.clone(),
        })
    }
}

/// Discriminated result from the user service. `None` (absent) means
/// credentials were rejected outright; `Some(Error)` carries an
/// already-localized, display-safe message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticateResult {
    Full { principal: ClaimsPrincipal },
    Partial {
        principal: ClaimsPrincipal,
        partial_sign_in_redirect_path: String,
    },
    Error { message: String },
}

impl AuthenticateResult {
    pub fn is_error(&self) -> bool {
        matches!(self, AuthenticateResult::Error { .. })
    }
}

/// Well-known claim types exchanged with the host bridge and the claim
/// types an `AuthenticateResult::Full` principal must carry.
pub mod claim_types {
    pub const SUBJECT: &str = "sub";
    pub const NAME: &str = "name";
    pub const AUTHENTICATION_METHOD: &str = "amr";
    pub const AUTHENTICATION_TIME: &str = "auth_time";
    pub const IDENTITY_PROVIDER: &str = "idp";

    /// Bookkeeping claims. Always stripped before a full principal is issued.
    pub const EXTERNAL_PROVIDER_USER_ID: &str = "external_provider_user_id";
    pub const PARTIAL_LOGIN_RETURN_URL: &str = "partial_login_return_url";

    /// Claim types a fully-authenticated principal must carry before it can
    /// be issued as an `AuthenticateResult::Full`.
    pub const AUTHENTICATE_RESULT_CLAIM_TYPES: &[&str] = &[
        SUBJECT,
        NAME,
        AUTHENTICATION_METHOD,
        AUTHENTICATION_TIME,
        IDENTITY_PROVIDER,
    ];

    /// Runtime-formatted claim type naming a partial-login continuation.
    /// Preserve the exact formatting: the same `resume_id` both names this
    /// claim type and parametrizes the `/resume?resume=` URL.
    pub fn partial_login_resume_id(resume_id: &str) -> String {
        format!("partial_login_resume_id:{resume_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_claim_set_detected() {
        let mut principal = ClaimsPrincipal::default();
        for t in claim_types::AUTHENTICATE_RESULT_CLAIM_TYPES {
            principal.add_claim(*t, "v", "issuer");
        }
        assert!(principal.has_all_claim_types(claim_types::AUTHENTICATE_RESULT_CLAIM_TYPES));
    }

    #[test]
    fn partial_claim_set_missing_one_is_detected() {
        let mut principal = ClaimsPrincipal::default();
        principal.add_claim(claim_types::SUBJECT, "v", "issuer");
        assert!(!principal.has_all_claim_types(claim_types::AUTHENTICATE_RESULT_CLAIM_TYPES));
    }

    #[test]
    fn resume_claim_type_formatting_is_stable() {
        assert_eq!(
            claim_types::partial_login_resume_id("abc123"),
            "partial_login_resume_id:abc123"
        );
    }

    #[test]
    fn external_identity_reconstructed_from_principal() {
        let mut principal = ClaimsPrincipal::default();
        principal.add_claim(claim_types::EXTERNAL_PROVIDER_USER_ID, "user-42", "google");
        principal.add_claim(claim_types::SUBJECT, "user-42", "google");

        let identity = ExternalIdentity::from_principal(&principal).unwrap();
        assert_eq!(identity.provider, "google");
        assert_eq!(identity.provider_id, "user-42");
        assert_eq!(identity.claims.len(), 2);
    }

    #[test]
    fn remove_claims_strips_bookkeeping() {
        let mut principal = ClaimsPrincipal::default();
        principal.add_claim(claim_types::PARTIAL_LOGIN_RETURN_URL, "x", "self");
        principal.add_claim(claim_types::SUBJECT, "s", "self");
        principal.remove_claims(claim_types::PARTIAL_LOGIN_RETURN_URL);
        assert!(!principal.has_claim_type(claim_types::PARTIAL_LOGIN_RETURN_URL));
        assert!(principal.has_claim_type(claim_types::SUBJECT));
    }
}
