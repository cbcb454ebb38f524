//! Concrete `HostAuthBridge` for an OIDC-speaking upstream provider.
//!
//! Mirrors the authorization-code exchange a browser-facing OAuth2 client
//! needs: build an authorize URL per provider, exchange the callback code
//! for tokens, and validate the id token's signature against the
//! provider's JWKS before trusting its subject claim. Session issuance
//! itself is deliberately left to the caller (`sign_in`/`sign_out` here
//! only track which sessions exist) — the interesting OIDC-specific work
//! is the challenge/callback exchange.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use oauth2::{
    basic::{BasicErrorResponseType, BasicTokenType},
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    ExtraTokenFields, RedirectUrl, Scope, StandardErrorResponse, StandardRevocableToken,
    StandardTokenIntrospectionResponse, StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};

use crate::domain::{claim_types, ClaimsPrincipal, ExternalIdentity};

use super::{AuthScheme, HostAuthBridge};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OidcTokenFields {
    id_token: Option<String>,
}

impl ExtraTokenFields for OidcTokenFields {}

type ConfiguredOAuthClient = oauth2::Client<
    StandardErrorResponse<BasicErrorResponseType>,
    StandardTokenResponse<OidcTokenFields, BasicTokenType>,
    StandardTokenIntrospectionResponse<OidcTokenFields, BasicTokenType>,
    StandardRevocableToken,
    StandardErrorResponse<oauth2::RevocationErrorResponseType>,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Per-provider endpoint configuration. One entry per `idp` value a
/// `SignInMessage` is allowed to name.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub jwks_url: String,
    pub issuer: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<serde_json::Value>,
}

pub struct OidcHostAuthBridge {
    providers: HashMap<String, ProviderConfig>,
    http_client: reqwest::Client,
    sessions: Mutex<HashMap<String, ClaimsPrincipal>>,
}

impl OidcHostAuthBridge {
    pub fn new(
        providers: HashMap<String, ProviderConfig>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            providers,
            http_client,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    fn oauth_client(&self, provider: &str, redirect_uri: &str) -> anyhow::Result<ConfiguredOAuthClient> {
        let config = self
            .providers
            .get(provider)
            .ok_or_else(|| anyhow::anyhow!("unknown external provider: {provider}"))?;

        let client_id = ClientId::new(config.client_id.clone());
        let client_secret = ClientSecret::new(config.client_secret.clone());
        let auth_url = AuthUrl::new(config.auth_url.clone())?;
        let token_url = TokenUrl::new(config.token_url.clone())?;
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())?;

        Ok(oauth2::Client::new(client_id)
            .set_client_secret(client_secret)
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url))
    }

    async fn fetch_jwks(&self, provider: &ProviderConfig) -> anyhow::Result<Jwks> {
        let jwks = self
            .http_client
            .get(&provider.jwks_url)
            .send()
            .await?
            .json::<Jwks>()
            .await?;
        Ok(jwks)
    }

    /// Validate an id token's signature and issuer, returning its subject.
    /// Key lookup by `kid` against the fetched JWKS; RS256 only, matching
    /// what every mainstream OIDC provider issues for browser-facing flows.
    async fn validate_id_token(&self, provider: &ProviderConfig, id_token: &str) -> anyhow::Result<String> {
        let header = decode_header(id_token)?;
        let kid = header
            .kid
            .ok_or_else(|| anyhow::anyhow!("id token header missing kid"))?;

        let jwks = self.fetch_jwks(provider).await?;
        let key = jwks
            .keys
            .iter()
            .find(|k| k.get("kid").and_then(|v| v.as_str()) == Some(kid.as_str()))
            .ok_or_else(|| anyhow::anyhow!("no matching jwk for kid {kid}"))?;

        let n = key
            .get("n")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("jwk missing modulus"))?;
        let e = key
            .get("e")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("jwk missing exponent"))?;

        let decoding_key = DecodingKey::from_rsa_components(n, e)?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[provider.issuer.clone()]);
        validation.set_audience(&[provider.client_id.clone()]);

        #[derive(Deserialize)]
        struct Claims {
            sub: String,
        }
        let data = decode::<Claims>(id_token, &decoding_key, &validation)?;
        Ok(data.claims.sub)
    }
}

#[async_trait]
impl HostAuthBridge for OidcHostAuthBridge {
    async fn sign_in(&self, principal: &ClaimsPrincipal, _scheme: AuthScheme) -> String {
        let session_id: String =
            std::iter::repeat_with(fastrand::alphanumeric).take(32).collect();
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
        self.providers.contains_key(provider)
    }

    fn challenge_url(&self, provider: &str, state: &str, redirect_uri: &str) -> anyhow::Result<String> {
        let client = self.oauth_client(provider, redirect_uri)?;
        let (auth_url, _csrf) = client
            .authorize_url(|| CsrfToken::new(state.to_string()))
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .url();
        Ok(auth_url.to_string())
    }

    async fn complete_challenge(
        &self,
        provider: &str,
        code: &str,
        redirect_uri: &str,
    ) -> anyhow::Result<ExternalIdentity> {
        let config = self
            .providers
            .get(provider)
            .ok_or_else(|| anyhow::anyhow!("unknown external provider: {provider}"))?
            .clone();
        let client = self.oauth_client(provider, redirect_uri)?;

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| anyhow::anyhow!("token exchange failed: {e}"))?;

        let id_token = token_response
            .extra_fields()
            .id_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider did not return an id_token"))?;

        let subject = self.validate_id_token(&config, &id_token).await?;

        let claims = vec![
            crate::domain::Claim::new(claim_types::SUBJECT, &subject, provider),
            crate::domain::Claim::new(claim_types::EXTERNAL_PROVIDER_USER_ID, &subject, provider),
            crate::domain::Claim::new(claim_types::IDENTITY_PROVIDER, provider, "self"),
        ];

        Ok(ExternalIdentity {
            provider: provider.to_string(),
            provider_id: subject,
            claims,
        })
    }

    async fn current_principal(&self, session_id: &str) -> Option<ClaimsPrincipal> {
        self.sessions
            .lock()
            .expect("session map mutex poisoned")
            .get(session_id)
            .cloned()
    }
}
