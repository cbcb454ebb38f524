//! The seven HTTP handlers that drive the state machine: local credential
//! submission, the external-provider round trip, partial-login resume, and
//! sign-out. Every handler starts with the max-input-length gate before
//! touching a cookie store, a capability call, or an event.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Form;
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::capabilities::{AuthEvent, AuthScheme};
use crate::cookies::{AntiForgery, HostAuthCookie, LastUserName, MessageStore, SessionId};
use crate::domain::{claim_types, AuthenticateResult, ExternalIdentity, SignInMessage};
use crate::view::{ErrorViewModel, LoggedOutViewModel, LoginViewModel, LogoutViewModel};

use super::{is_oversize, AppState, ExternalChallengeContext};

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub signin: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoginForm {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub remember_me: Option<bool>,
    #[serde(default)]
    pub remember_me_offered: Option<String>,
    #[serde(default)]
    pub anti_forgery_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalQuery {
    pub signin: String,
    pub provider: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeQuery {
    pub resume: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LogoutForm {
    #[serde(default)]
    pub anti_forgery_token: Option<String>,
}

/// `GET /login?signin={id}` — the entry point for a flow.
pub async fn login_get(
    State(app): State<AppState>,
    Query(query): Query<LoginQuery>,
    jar: PrivateCookieJar,
) -> Response {
    if is_oversize(&query.signin, &app.config) {
        return error_page(&app, 400, "the request is invalid");
    }

    let Some(message) = app.sign_in_messages.read(&jar, &query.signin) else {
        return error_page(&app, 400, "no sign-in request found for this id");
    };

    if !app.client_store.client_exists(&message.client_id).await {
        return error_page(&app, 400, "unknown client");
    }

    if let Some(result) = app.user_service.pre_authenticate(&message).await {
        return match result {
            AuthenticateResult::Error { message: err } => {
                app.event_service
                    .record(AuthEvent::PreLoginFailure {
                        username: String::new(),
                    })
                    .await;
                error_page(&app, 400, err)
            }
            full @ AuthenticateResult::Full { .. } => {
                app.event_service
                    .record(AuthEvent::PreLoginSuccess {
                        username: subject_of(&full),
                    })
                    .await;
                sign_in_and_redirect(&app, jar, &query.signin, message, full, None).await
            }
            partial @ AuthenticateResult::Partial { .. } => {
                sign_in_and_redirect(&app, jar, &query.signin, message, partial, None).await
            }
        };
    }

    if let Some(provider) = message.idp.clone() {
        if app
            .client_store
            .is_identity_provider_allowed(&message.client_id, &provider)
            .await
            && app.host_bridge.supports_provider(&provider)
        {
            let target = format!("/external?signin={}&provider={provider}", query.signin);
            return (jar, redirect_302(&target)).into_response();
        }
    }

    render_login_page(&app, jar, &query.signin, &message, None, None, None).await
}

/// `POST /login` — local credential submission.
pub async fn login_post(
    State(app): State<AppState>,
    Query(query): Query<LoginQuery>,
    jar: PrivateCookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if !app.config.enable_local_login {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    if is_oversize(&query.signin, &app.config) {
        return error_page(&app, 400, "the request is invalid");
    }

    if !AntiForgery::verify(&jar, form.anti_forgery_token.as_deref()) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(message) = app.sign_in_messages.read(&jar, &query.signin) else {
        return error_page(&app, 400, "no sign-in request found for this id");
    };

    if !app.client_store.allows_local_login(&message.client_id).await {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    // Null means the form never offered the checkbox at all; true/false
    // means the user did (or didn't) check it.
    let remember_me = form
        .remember_me_offered
        .as_ref()
        .map(|_| form.remember_me.unwrap_or(false));

    let username = form
        .username
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let password = form
        .password
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let (Some(username), Some(password)) = (username, password) else {
        return render_login_page(
            &app,
            jar,
            &query.signin,
            &message,
            username.map(str::to_string),
            remember_me,
            Some("username and password are required".to_string()),
        )
        .await;
    };

    if is_oversize(username, &app.config) || is_oversize(password, &app.config) {
        // Defense against probing: re-render with no field error at all.
        return render_login_page(
            &app,
            jar,
            &query.signin,
            &message,
            Some(username.to_string()),
            remember_me,
            None,
        )
        .await;
    }

    match app.user_service.authenticate_local(username, password).await {
        None => {
            app.event_service
                .record(AuthEvent::LocalLoginFailure {
                    username: username.to_string(),
                    reason: "invalid_credentials".to_string(),
                })
                .await;
            render_login_page(
                &app,
                jar,
                &query.signin,
                &message,
                Some(username.to_string()),
                remember_me,
                Some("invalid username or password".to_string()),
            )
            .await
        }
        Some(AuthenticateResult::Error { message: msg }) => {
            app.event_service
                .record(AuthEvent::LocalLoginFailure {
                    username: username.to_string(),
                    reason: msg.clone(),
                })
                .await;
            render_login_page(
                &app,
                jar,
                &query.signin,
                &message,
                Some(username.to_string()),
                remember_me,
                Some(msg),
            )
            .await
        }
        Some(result) => {
            let jar = LastUserName::set(
                jar,
                username,
                app.config.cookie_domain.as_deref(),
                app.config.cookie_secure_flag(),
            );
            let subject = subject_of(&result);
            app.event_service
                .record(AuthEvent::LocalLoginSuccess { subject })
                .await;
            sign_in_and_redirect(&app, jar, &query.signin, message, result, remember_me).await
        }
    }
}

/// `GET /external?signin&provider` — starts a round trip to an external
/// identity provider. Redirects straight to the provider rather than
/// relying on an authentication-middleware rewrite, since axum has no such
/// hook: the handler issues the redirect itself.
pub async fn external_get(
    State(app): State<AppState>,
    Query(query): Query<ExternalQuery>,
    jar: PrivateCookieJar,
) -> Response {
    if is_oversize(&query.signin, &app.config) || is_oversize(&query.provider, &app.config) {
        return error_page(&app, 400, "the request is invalid");
    }

    let Some(message) = app.sign_in_messages.read(&jar, &query.signin) else {
        return error_page(&app, 400, "no sign-in request found for this id");
    };

    if !app
        .client_store
        .is_identity_provider_allowed(&message.client_id, &query.provider)
        .await
    {
        app.event_service
            .record(AuthEvent::EndpointFailure {
                endpoint: "Authenticate".to_string(),
                error: format!("provider '{}' is not allowed for this client", query.provider),
            })
            .await;
        return error_page(&app, 400, "this sign-in method is not available");
    }

    if !app.host_bridge.supports_provider(&query.provider) {
        app.event_service
            .record(AuthEvent::EndpointFailure {
                endpoint: "Authenticate".to_string(),
                error: format!("provider '{}' is not configured on this host", query.provider),
            })
            .await;
        return error_page(&app, 400, "this sign-in method is not available");
    }

    let redirect_uri = join_base_path(&app.config.base_url, "callback");
    let state_token = random_token();
    let context = ExternalChallengeContext {
        signin_id: query.signin.clone(),
        provider: query.provider.clone(),
    };
    let jar = app.external_challenges.put(jar, &state_token, &context);

    let challenge_url = match app
        .host_bridge
        .challenge_url(&query.provider, &state_token, &redirect_uri)
    {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, provider = %query.provider, "failed to build challenge url");
            return error_page(&app, 500, "unable to start sign-in with this provider");
        }
    };

    (jar, redirect_302(&challenge_url)).into_response()
}

/// `GET /callback` — completes an external provider's round trip.
pub async fn callback_get(
    State(app): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: PrivateCookieJar,
) -> Response {
    if let Some(error) = &query.error {
        let truncated: String = error.chars().take(app.config.max_input_param_length).collect();
        let provider = query
            .state
            .as_deref()
            .and_then(|s| app.external_challenges.read(&jar, s))
            .map(|c| c.provider)
            .unwrap_or_default();
        app.event_service
            .record(AuthEvent::ExternalLoginError {
                provider,
                error: truncated.clone(),
            })
            .await;
        return error_page(&app, 400, format!("sign-in was not completed: {truncated}"));
    }

    let Some(state_token) = query.state.as_deref() else {
        return error_page(&app, 400, "the request is invalid");
    };
    if is_oversize(state_token, &app.config) {
        return error_page(&app, 400, "the request is invalid");
    }

    let Some(context) = app.external_challenges.read(&jar, state_token) else {
        return error_page(&app, 400, "no sign-in request found for this id");
    };
    let jar = app.external_challenges.clear(jar, state_token);

    let Some(message) = app.sign_in_messages.read(&jar, &context.signin_id) else {
        return error_page(&app, 400, "no sign-in request found for this id");
    };

    let Some(code) = query.code.as_deref() else {
        return error_page(&app, 400, "the request is invalid");
    };

    let redirect_uri = join_base_path(&app.config.base_url, "callback");
    let identity = match app
        .host_bridge
        .complete_challenge(&context.provider, code, &redirect_uri)
        .await
    {
        Ok(identity) => identity,
        Err(e) => {
            tracing::error!(error = %e, provider = %context.provider, "external challenge completion failed");
            return render_login_page(
                &app,
                jar,
                &context.signin_id,
                &message,
                None,
                None,
                Some("no matching external account was found".to_string()),
            )
            .await;
        }
    };

    authenticate_external_and_continue(&app, jar, context.signin_id, message, identity).await
}

/// `GET /resume?resume={id}` — continues a partial login once whatever was
/// missing (a second factor, extra profile data) has been supplied
/// elsewhere and the host bridge's session now reflects it.
pub async fn resume_get(
    State(app): State<AppState>,
    Query(query): Query<ResumeQuery>,
    jar: PrivateCookieJar,
) -> Response {
    if is_oversize(&query.resume, &app.config) {
        return error_page(&app, 400, "the request is invalid");
    }

    let Some((token, scheme)) = HostAuthCookie::read(&jar) else {
        return error_page(&app, 400, "no pending sign-in to resume");
    };
    if scheme != AuthScheme::Partial {
        return error_page(&app, 400, "no pending sign-in to resume");
    }

    let Some(principal) = app.host_bridge.current_principal(&token).await else {
        return error_page(&app, 400, "no pending sign-in to resume");
    };

    let resume_claim_type = claim_types::partial_login_resume_id(&query.resume);
    let Some(resume_claim) = principal.find_first(&resume_claim_type) else {
        return error_page(&app, 400, "this sign-in can no longer be resumed");
    };
    let signin_id = resume_claim.value.clone();

    let Some(message) = app.sign_in_messages.read(&jar, &signin_id) else {
        return error_page(&app, 400, "no sign-in request found for this id");
    };

    if principal.has_all_claim_types(claim_types::AUTHENTICATE_RESULT_CLAIM_TYPES) {
        let mut full_principal = principal.clone();
        full_principal.remove_claims(claim_types::PARTIAL_LOGIN_RETURN_URL);
        full_principal.remove_claims(claim_types::EXTERNAL_PROVIDER_USER_ID);
        full_principal.remove_claims(&resume_claim_type);

        let subject = full_principal
            .find_first(claim_types::SUBJECT)
            .map(|c| c.value.clone())
            .unwrap_or_default();
        app.event_service
            .record(AuthEvent::PartialLoginComplete { subject })
            .await;
        return sign_in_and_redirect(
            &app,
            jar,
            &signin_id,
            message,
            AuthenticateResult::Full {
                principal: full_principal,
            },
            None,
        )
        .await;
    }

    let Some(identity) = ExternalIdentity::from_principal(&principal) else {
        return error_page(&app, 400, "this sign-in can no longer be resumed");
    };

    authenticate_external_and_continue(&app, jar, signin_id, message, identity).await
}

/// Shared tail of the external-callback and resume-promotion paths: both
/// end by handing a freshly reconstructed `ExternalIdentity` to
/// `AuthenticateExternal` and branching on the result the same way.
async fn authenticate_external_and_continue(
    app: &AppState,
    jar: PrivateCookieJar,
    signin_id: String,
    message: SignInMessage,
    identity: ExternalIdentity,
) -> Response {
    match app.user_service.authenticate_external(&identity).await {
        None => {
            app.event_service
                .record(AuthEvent::ExternalLoginFailure {
                    provider: identity.provider.clone(),
                    reason: "invalid_credentials".to_string(),
                })
                .await;
            render_login_page(
                app,
                jar,
                &signin_id,
                &message,
                None,
                None,
                Some("no matching external account was found".to_string()),
            )
            .await
        }
        Some(AuthenticateResult::Error { message: msg }) => {
            app.event_service
                .record(AuthEvent::ExternalLoginFailure {
                    provider: identity.provider.clone(),
                    reason: msg.clone(),
                })
                .await;
            render_login_page(app, jar, &signin_id, &message, None, None, Some(msg)).await
        }
        Some(result) => {
            let subject = subject_of(&result);
            app.event_service
                .record(AuthEvent::ExternalLoginSuccess {
                    provider: identity.provider.clone(),
                    subject,
                })
                .await;
            sign_in_and_redirect(app, jar, &signin_id, message, result, None).await
        }
    }
}

/// `GET /logout?id={signOutId}` — the sign-out confirmation prompt.
pub async fn logout_get(
    State(app): State<AppState>,
    Query(query): Query<LogoutQuery>,
    jar: PrivateCookieJar,
) -> Response {
    if let Some(id) = &query.id {
        if is_oversize(id, &app.config) {
            return error_page(&app, 400, "the request is invalid");
        }
    }

    let sign_out_message = match &query.id {
        Some(id) => app.sign_out_messages.read(&jar, id),
        None => None,
    };
    let authenticated = HostAuthCookie::read(&jar).is_some();
    let client_initiated = sign_out_message
        .as_ref()
        .and_then(|m| m.client_id.as_ref())
        .is_some();

    if !authenticated || client_initiated || !app.config.enable_sign_out_prompt {
        return perform_logout(&app, jar, query.id.clone()).await;
    }

    let client_display_name = match sign_out_message.as_ref().and_then(|m| m.client_id.clone()) {
        Some(client_id) => app.client_store.display_name(&client_id).await,
        None => None,
    };

    let (jar, anti_forgery_token) = AntiForgery::issue(
        jar,
        app.config.cookie_domain.as_deref(),
        app.config.cookie_secure_flag(),
    );
    let model = LogoutViewModel {
        client_display_name,
        anti_forgery_token,
        sign_out_id: query.id.clone().unwrap_or_default(),
    };
    (jar, app.view_service.render_logout(model)).into_response()
}

/// `POST /logout` — the confirmed sign-out.
pub async fn logout_post(
    State(app): State<AppState>,
    Query(query): Query<LogoutQuery>,
    jar: PrivateCookieJar,
    Form(form): Form<LogoutForm>,
) -> Response {
    if let Some(id) = &query.id {
        if is_oversize(id, &app.config) {
            return error_page(&app, 400, "the request is invalid");
        }
    }

    if !AntiForgery::verify(&jar, form.anti_forgery_token.as_deref()) {
        return StatusCode::FORBIDDEN.into_response();
    }

    perform_logout(&app, jar, query.id.clone()).await
}

/// The actual sign-out work, shared by the POST handler and `GET /logout`'s
/// auto-skip forward.
async fn perform_logout(app: &AppState, jar: PrivateCookieJar, id: Option<String>) -> Response {
    let sign_out_message = match &id {
        Some(id) => app.sign_out_messages.read(&jar, id),
        None => None,
    };

    let principal = match HostAuthCookie::read(&jar) {
        Some((token, _scheme)) => app.host_bridge.current_principal(&token).await,
        None => None,
    };

    let mut jar = SessionId::clear(jar);
    if let Some(id) = &id {
        jar = app.sign_out_messages.clear(jar, id);
    }

    let token = HostAuthCookie::read(&jar).map(|(token, _scheme)| token);
    let jar = HostAuthCookie::clear(jar);

    if let Some(token) = token {
        // The host cookie has a single slot, so whichever of
        // primary/external/partial was active, this one call tears it
        // down, including any external-provider scheme.
        app.host_bridge.sign_out(&token).await;
    }

    if let Some(principal) = &principal {
        let subject = principal
            .find_first(claim_types::SUBJECT)
            .map(|c| c.value.clone());
        app.event_service.record(AuthEvent::Logout { subject }).await;
    }

    let (post_logout_redirect_url, client_display_name) = match &sign_out_message {
        Some(msg) => {
            let display_name = match &msg.client_id {
                Some(client_id) => app.client_store.display_name(client_id).await,
                None => None,
            };
            (msg.return_url.clone(), display_name)
        }
        None => (None, None),
    };

    let model = LoggedOutViewModel {
        post_logout_redirect_url,
        client_display_name,
    };
    (jar, app.view_service.render_logged_out(model)).into_response()
}

/// Issues the authentication cookie under the scheme the result implies,
/// clears the superseded message/auth state, and redirects to the flow's
/// destination.
async fn sign_in_and_redirect(
    app: &AppState,
    jar: PrivateCookieJar,
    signin_id: &str,
    message: SignInMessage,
    result: AuthenticateResult,
    remember_me: Option<bool>,
) -> Response {
    let domain = app.config.cookie_domain.as_deref();
    let secure = app.config.cookie_secure_flag();

    match result {
        AuthenticateResult::Full { mut principal } => {
            principal.remove_claims(claim_types::PARTIAL_LOGIN_RETURN_URL);
            principal.remove_claims(claim_types::EXTERNAL_PROVIDER_USER_ID);
            principal
                .claims
                .retain(|c| !c.claim_type.starts_with("partial_login_resume_id:"));

            if !app
                .client_store
                .is_redirect_uri_allowed(&message.client_id, &message.return_url)
                .await
            {
                return error_page(app, 400, "the redirect target is not allowed for this client");
            }

            let jar = app.sign_in_messages.clear(jar, signin_id);

            // rememberMe persistence: an explicit choice wins, otherwise
            // fall back to the server's configured default.
            let persistent = match remember_me {
                Some(true) => true,
                Some(false) => false,
                None => app.config.persistent_login_default,
            };
            let expires_at = if persistent {
                Some(
                    OffsetDateTime::now_utc()
                        + Duration::seconds(app.config.remember_me_duration_secs as i64),
                )
            } else {
                None
            };

            // The single host-cookie slot clears whatever scheme was
            // active before issuing the new one.
            let token = app.host_bridge.sign_in(&principal, AuthScheme::Primary).await;
            let jar = HostAuthCookie::issue(jar, &token, AuthScheme::Primary, domain, secure, expires_at);
            let (jar, _session_id) = SessionId::issue(jar, domain, secure);

            (jar, redirect_302(&message.return_url)).into_response()
        }
        AuthenticateResult::Partial {
            mut principal,
            partial_sign_in_redirect_path,
        } => {
            // SignInMessage is retained; still needed at resume.
            let resume_id = random_token();
            let resume_url = join_base_path(&app.config.base_url, &format!("resume?resume={resume_id}"));
            principal.add_claim(claim_types::PARTIAL_LOGIN_RETURN_URL, &resume_url, "self");
            principal.add_claim(
                claim_types::partial_login_resume_id(&resume_id),
                signin_id,
                "self",
            );

            let token = app.host_bridge.sign_in(&principal, AuthScheme::Partial).await;
            let jar = HostAuthCookie::issue(jar, &token, AuthScheme::Partial, domain, secure, None);
            let (jar, _session_id) = SessionId::issue(jar, domain, secure);

            let redirect_url = join_base_path(
                &app.config.base_url,
                partial_sign_in_redirect_path.trim_start_matches("~/"),
            );
            (jar, redirect_302(&redirect_url)).into_response()
        }
        AuthenticateResult::Error { message: msg } => error_page(app, 400, msg),
    }
}

/// Assembles and renders the login page, including the
/// local-login-disabled short-circuit to a single eligible provider or to
/// an error page when none is available.
async fn render_login_page(
    app: &AppState,
    jar: PrivateCookieJar,
    signin_id: &str,
    message: &SignInMessage,
    submitted_username: Option<String>,
    remember_me: Option<bool>,
    error_message: Option<String>,
) -> Response {
    let enable_local_login =
        app.config.enable_local_login && app.client_store.allows_local_login(&message.client_id).await;

    let mut external_providers = app.client_store.eligible_providers(&message.client_id).await;
    external_providers.retain(|p| app.host_bridge.supports_provider(p));
    if let Some(idp) = &message.idp {
        if app.host_bridge.supports_provider(idp) && !external_providers.iter().any(|p| p == idp) {
            external_providers.push(idp.clone());
        }
    }

    if !enable_local_login {
        match external_providers.as_slice() {
            [] => return error_page(app, 400, "no sign-in method is available for this client"),
            [only] => {
                let target = format!("/external?signin={signin_id}&provider={only}");
                return (jar, redirect_302(&target)).into_response();
            }
            _ => {}
        }
    }

    // Username precedence: submitted value -> login hint (if enabled) ->
    // remembered last username.
    let username = submitted_username
        .or_else(|| {
            if app.config.enable_login_hint {
                message.login_hint.clone()
            } else {
                None
            }
        })
        .or_else(|| LastUserName::read(&jar));

    let client_display_name = app.client_store.display_name(&message.client_id).await;

    let (jar, anti_forgery_token) = AntiForgery::issue(
        jar,
        app.config.cookie_domain.as_deref(),
        app.config.cookie_secure_flag(),
    );

    let model = LoginViewModel {
        signin_id: signin_id.to_string(),
        client_display_name,
        username,
        enable_local_login,
        enable_login_hint: app.config.enable_login_hint,
        remember_me: remember_me.unwrap_or(false),
        external_providers,
        anti_forgery_token,
        error_message,
    };

    (jar, app.view_service.render_login(model)).into_response()
}

/// 302 Found to `url`. Every redirect this endpoint issues should be a 302,
/// and axum's own `Redirect::to` defaults to 303, so the status is set
/// explicitly here instead.
fn redirect_302(url: &str) -> Response {
    (
        StatusCode::FOUND,
        [(axum::http::header::LOCATION, url.to_string())],
    )
        .into_response()
}

fn error_page(app: &AppState, status: u16, message: impl Into<String>) -> Response {
    app.view_service.render_error(ErrorViewModel {
        status,
        message: message.into(),
    })
}

fn subject_of(result: &AuthenticateResult) -> String {
    let principal = match result {
        AuthenticateResult::Full { principal } => principal,
        AuthenticateResult::Partial { principal, .. } => principal,
        AuthenticateResult::Error { .. } => return String::new(),
    };
    principal
        .find_first(claim_types::SUBJECT)
        .map(|c| c.value.clone())
        .unwrap_or_default()
}

fn random_token() -> String {
    std::iter::repeat_with(fastrand::alphanumeric).take(24).collect()
}

fn join_base_path(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::header::{LOCATION, SET_COOKIE};
    use axum_extra::extract::cookie::Key;

    use super::*;
    use crate::capabilities::memory::{
        ClientRecord, InMemoryClientStore, InMemoryHostAuthBridge, InMemoryUserService,
        RecordingEventService, UserRecord,
    };
    use crate::config::{Config, Environment};
    use crate::cookies::InMemoryStore;
    use crate::domain::{ClaimsPrincipal, SignOutMessage};
    use crate::view::AskamaViewService;

    fn test_config() -> Config {
        Config {
            environment: Environment::Development,
            server_host: "127.0.0.1".into(),
            server_port: 5000,
            base_url: "https://idsvr.test".into(),
            enable_local_login: true,
            enable_sign_out_prompt: true,
            enable_login_hint: true,
            persistent_login_default: false,
            remember_me_duration_secs: 3600,
            max_input_param_length: 16,
            cookie_domain: None,
            cookie_signing_key: "k".repeat(64),
            http_connect_timeout_secs: 1,
            http_request_timeout_secs: 1,
        }
    }

    struct Harness {
        app: AppState,
        events: Arc<RecordingEventService>,
        users: Arc<InMemoryUserService>,
        clients: Arc<InMemoryClientStore>,
        bridge: Arc<InMemoryHostAuthBridge>,
    }

    fn harness() -> Harness {
        let events = Arc::new(RecordingEventService::new());
        let users = Arc::new(InMemoryUserService::new());
        let clients = Arc::new(InMemoryClientStore::new());
        let bridge = Arc::new(InMemoryHostAuthBridge::new());
        let app = AppState {
            config: Arc::new(test_config()),
            user_service: users.clone(),
            client_store: clients.clone(),
            event_service: events.clone(),
            view_service: Arc::new(AskamaViewService::new()),
            host_bridge: bridge.clone(),
            sign_in_messages: Arc::new(InMemoryStore::new()),
            sign_out_messages: Arc::new(InMemoryStore::new()),
            external_challenges: Arc::new(InMemoryStore::new()),
            cookie_key: Key::generate(),
        };
        Harness {
            app,
            events,
            users,
            clients,
            bridge,
        }
    }

    fn empty_jar(app: &AppState) -> PrivateCookieJar {
        PrivateCookieJar::new(app.cookie_key.clone())
    }

    fn sample_message(client_id: &str, return_url: &str) -> SignInMessage {
        SignInMessage {
            client_id: client_id.to_string(),
            return_url: return_url.to_string(),
            idp: None,
            login_hint: None,
            acr_values: None,
            tenant: None,
        }
    }

    fn cookie_names(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().split('=').next().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn oversize_signin_is_rejected_with_no_side_effects() {
        let h = harness();
        let jar = empty_jar(&h.app);
        let long_signin = "x".repeat(h.app.config.max_input_param_length + 1);

        let response = login_get(
            State(h.app.clone()),
            Query(LoginQuery { signin: long_signin }),
            jar,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn login_get_rejects_message_for_unregistered_client() {
        let h = harness();
        let message = sample_message("ghost-client", "https://rp/cb");
        let jar = empty_jar(&h.app);
        let jar = h.app.sign_in_messages.put(jar, "abc", &message);

        let response = login_get(
            State(h.app.clone()),
            Query(LoginQuery { signin: "abc".into() }),
            jar,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_post_without_matching_anti_forgery_token_is_rejected() {
        let h = harness();
        let jar = empty_jar(&h.app);

        let response = login_post(
            State(h.app.clone()),
            Query(LoginQuery { signin: "abc".into() }),
            jar,
            Form(LoginForm {
                anti_forgery_token: Some("wrong".into()),
                ..Default::default()
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn happy_local_login_clears_message_and_redirects() {
        let h = harness();
        h.clients.add_client(
            "c1",
            ClientRecord {
                redirect_uris: vec!["https://rp/cb".into()],
                ..Default::default()
            },
        );
        let mut claims = ClaimsPrincipal::default();
        for t in claim_types::AUTHENTICATE_RESULT_CLAIM_TYPES {
            claims.add_claim(*t, "alice", "self");
        }
        h.users.add_user(
            "alice",
            UserRecord {
                password: "pw".into(),
                claims,
                partial_redirect: None,
            },
        );

        let message = sample_message("c1", "https://rp/cb");
        let jar = empty_jar(&h.app);
        let jar = h.app.sign_in_messages.put(jar, "abc", &message);
        let (jar, token) = AntiForgery::issue(jar, None, false);

        let response = login_post(
            State(h.app.clone()),
            Query(LoginQuery { signin: "abc".into() }),
            jar,
            Form(LoginForm {
                username: Some("alice".into()),
                password: Some("pw".into()),
                remember_me: Some(true),
                remember_me_offered: Some("1".into()),
                anti_forgery_token: Some(token),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "https://rp/cb");
        assert!(h.app.sign_in_messages.read(&empty_jar(&h.app), "abc").is_none());

        let names = cookie_names(&response);
        assert!(names.contains(&"sid".to_string()));
        assert!(names.contains(&"host_auth".to_string()));
        assert!(names.contains(&"last_username".to_string()));

        assert!(h
            .events
            .events()
            .iter()
            .any(|e| matches!(e, AuthEvent::LocalLoginSuccess { subject } if subject == "alice")));
    }

    #[tokio::test]
    async fn local_login_disabled_for_client_returns_405() {
        let h = harness();
        h.clients.add_client(
            "c1",
            ClientRecord {
                redirect_uris: vec!["https://rp/cb".into()],
                local_login_allowed: false,
                ..Default::default()
            },
        );
        let message = sample_message("c1", "https://rp/cb");
        let jar = empty_jar(&h.app);
        let jar = h.app.sign_in_messages.put(jar, "abc", &message);
        let (jar, token) = AntiForgery::issue(jar, None, false);

        let response = login_post(
            State(h.app.clone()),
            Query(LoginQuery { signin: "abc".into() }),
            jar,
            Form(LoginForm {
                username: Some("alice".into()),
                password: Some("pw".into()),
                anti_forgery_token: Some(token),
                ..Default::default()
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn external_challenge_stashes_context_and_redirects_to_provider() {
        let h = harness();
        h.clients.add_client(
            "c1",
            ClientRecord {
                allowed_providers: vec!["goog".into()],
                ..Default::default()
            },
        );
        let message = sample_message("c1", "https://rp/cb");
        let jar = empty_jar(&h.app);
        let jar = h.app.sign_in_messages.put(jar, "abc", &message);

        let response = external_get(
            State(h.app.clone()),
            Query(ExternalQuery {
                signin: "abc".into(),
                provider: "goog".into(),
            }),
            jar,
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert!(location.contains("goog"));
    }

    #[tokio::test]
    async fn external_challenge_rejects_provider_not_on_client_whitelist() {
        let h = harness();
        h.clients.add_client("c1", ClientRecord::default());
        let message = sample_message("c1", "https://rp/cb");
        let jar = empty_jar(&h.app);
        let jar = h.app.sign_in_messages.put(jar, "abc", &message);

        let response = external_get(
            State(h.app.clone()),
            Query(ExternalQuery {
                signin: "abc".into(),
                provider: "evil".into(),
            }),
            jar,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h
            .events
            .events()
            .iter()
            .any(|e| matches!(e, AuthEvent::EndpointFailure { endpoint, .. } if endpoint == "Authenticate")));
    }

    #[tokio::test]
    async fn partial_login_retains_sign_in_message_and_redirects_to_partial_path() {
        let h = harness();
        h.clients.add_client(
            "c1",
            ClientRecord {
                redirect_uris: vec!["https://rp/cb".into()],
                ..Default::default()
            },
        );
        let mut claims = ClaimsPrincipal::default();
        claims.add_claim(claim_types::SUBJECT, "bob", "self");
        h.users.add_user(
            "bob",
            UserRecord {
                password: "pw".into(),
                claims,
                partial_redirect: Some("~/register".into()),
            },
        );

        let message = sample_message("c1", "https://rp/cb");
        let jar = empty_jar(&h.app);
        let jar = h.app.sign_in_messages.put(jar, "abc", &message);
        let (jar, token) = AntiForgery::issue(jar, None, false);

        let response = login_post(
            State(h.app.clone()),
            Query(LoginQuery { signin: "abc".into() }),
            jar,
            Form(LoginForm {
                username: Some("bob".into()),
                password: Some("pw".into()),
                remember_me_offered: Some("1".into()),
                remember_me: Some(false),
                anti_forgery_token: Some(token),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let redirect_to = response.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert_eq!(redirect_to, "https://idsvr.test/register");
        // The sign-in message survives a partial sign-in; resuming it
        // still needs the original client/return-url context.
        assert!(h.app.sign_in_messages.read(&empty_jar(&h.app), "abc").is_some());
        assert!(cookie_names(&response).contains(&"host_auth".to_string()));
    }

    #[tokio::test]
    async fn resume_promotes_to_full_when_principal_carries_all_claims() {
        let h = harness();
        h.clients.add_client(
            "c1",
            ClientRecord {
                redirect_uris: vec!["https://rp/cb".into()],
                ..Default::default()
            },
        );

        let message = sample_message("c1", "https://rp/cb");
        let jar = empty_jar(&h.app);
        let jar = h.app.sign_in_messages.put(jar, "abc", &message);

        // Stands in for a principal a partial sign-in already stashed with
        // the host bridge: every claim `AuthenticateResult::Full` requires is
        // already present, plus the bookkeeping claims `resume_get` strips.
        let mut principal = ClaimsPrincipal::default();
        for t in claim_types::AUTHENTICATE_RESULT_CLAIM_TYPES {
            principal.add_claim(*t, "bob", "self");
        }
        let resume_id = "R1";
        principal.add_claim(claim_types::partial_login_resume_id(resume_id), "abc", "self");
        principal.add_claim(
            claim_types::PARTIAL_LOGIN_RETURN_URL,
            "https://idsvr.test/resume?resume=R1",
            "self",
        );

        let token = h.bridge.sign_in(&principal, AuthScheme::Partial).await;
        let jar = HostAuthCookie::issue(jar, &token, AuthScheme::Partial, None, false, None);

        let response = resume_get(
            State(h.app.clone()),
            Query(ResumeQuery {
                resume: resume_id.to_string(),
            }),
            jar,
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "https://rp/cb");
        assert!(h.app.sign_in_messages.read(&empty_jar(&h.app), "abc").is_none());
        assert!(h
            .events
            .events()
            .iter()
            .any(|e| matches!(e, AuthEvent::PartialLoginComplete { .. })));
    }

    #[tokio::test]
    async fn logout_prompt_auto_skips_for_client_initiated_sign_out() {
        let h = harness();
        h.clients.add_client(
            "c1",
            ClientRecord {
                display_name: Some("Example App".into()),
                ..Default::default()
            },
        );

        let jar = empty_jar(&h.app);
        let principal = ClaimsPrincipal::new(vec![]);
        let token = h.bridge.sign_in(&principal, AuthScheme::Primary).await;
        let jar = HostAuthCookie::issue(jar, &token, AuthScheme::Primary, None, false, None);
        let jar = h.app.sign_out_messages.put(
            jar,
            "z",
            &SignOutMessage {
                client_id: Some("c1".into()),
                return_url: Some("https://rp/out".into()),
            },
        );

        let response = logout_get(
            State(h.app.clone()),
            Query(LogoutQuery { id: Some("z".into()) }),
            jar,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(h.bridge.active_session(&token).is_none());
        assert!(h
            .events
            .events()
            .iter()
            .any(|e| matches!(e, AuthEvent::Logout { .. })));
    }
}
