//! Single-value cookies: the session id, the remembered last username, and
//! the anti-forgery double-submit token. Each of these is a flat cookie
//! (no per-id envelope) because there is exactly one of them per browser.

use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::capabilities::AuthScheme;

const SESSION_COOKIE: &str = "sid";
const LAST_USERNAME_COOKIE: &str = "last_username";
const ANTI_FORGERY_COOKIE: &str = "xsrf";
const HOST_AUTH_COOKIE: &str = "host_auth";

fn random_id() -> String {
    std::iter::repeat_with(fastrand::alphanumeric).take(32).collect()
}

fn base_cookie(name: &'static str, value: String, domain: Option<&str>, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    if let Some(domain) = domain {
        cookie.set_domain(domain.to_string());
    }
    cookie
}

/// `SessionId` — minted on each full sign-in, cleared on sign-out.
pub struct SessionId;

impl SessionId {
    pub fn issue(
        jar: PrivateCookieJar,
        domain: Option<&str>,
        secure: bool,
    ) -> (PrivateCookieJar, String) {
        let id = random_id();
        let cookie = base_cookie(SESSION_COOKIE, id.clone(), domain, secure);
        (jar.add(cookie), id)
    }

    pub fn read(jar: &PrivateCookieJar) -> Option<String> {
        jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
    }

    pub fn clear(jar: PrivateCookieJar) -> PrivateCookieJar {
        jar.remove(Cookie::from(SESSION_COOKIE))
    }
}

/// `LastUserName` — remembers the last successful local username. Written
/// unconditionally on every local login success, even when the submitted
/// username differs from whatever was previously remembered.
pub struct LastUserName;

impl LastUserName {
    pub fn set(
        jar: PrivateCookieJar,
        username: &str,
        domain: Option<&str>,
        secure: bool,
    ) -> PrivateCookieJar {
        let cookie = base_cookie(LAST_USERNAME_COOKIE, username.to_string(), domain, secure);
        jar.add(cookie)
    }

    pub fn read(jar: &PrivateCookieJar) -> Option<String> {
        jar.get(LAST_USERNAME_COOKIE).map(|c| c.value().to_string())
    }
}

/// Double-submit anti-forgery token: a signed cookie plus a matching form
/// field. `verify` is a constant-time comparison so response timing does
/// not leak how much of the token matched.
pub struct AntiForgery;

impl AntiForgery {
    pub fn issue(
        jar: PrivateCookieJar,
        domain: Option<&str>,
        secure: bool,
    ) -> (PrivateCookieJar, String) {
        let token = random_id();
        let cookie = base_cookie(ANTI_FORGERY_COOKIE, token.clone(), domain, secure);
        (jar.add(cookie), token)
    }

    pub fn verify(jar: &PrivateCookieJar, submitted: Option<&str>) -> bool {
        let (Some(cookie_value), Some(submitted)) =
            (jar.get(ANTI_FORGERY_COOKIE), submitted)
        else {
            return false;
        };
        constant_time_eq(cookie_value.value().as_bytes(), submitted.as_bytes())
    }
}

/// Which scheme currently holds the browser's host-issued identity, and
/// the opaque token the host bridge minted for it. Only one scheme is
/// ever active at a time, so a single slot, rather than three parallel
/// cookies, is enough: `issue()` clears any prior value before writing a
/// new one, so switching schemes never leaves two cookies disagreeing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HostAuthPayload {
    token: String,
    scheme: StoredScheme,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum StoredScheme {
    Primary,
    External,
    Partial,
}

impl From<AuthScheme> for StoredScheme {
    fn from(scheme: AuthScheme) -> Self {
        match scheme {
            AuthScheme::Primary => StoredScheme::Primary,
            AuthScheme::External => StoredScheme::External,
            AuthScheme::Partial => StoredScheme::Partial,
        }
    }
}

impl From<StoredScheme> for AuthScheme {
    fn from(scheme: StoredScheme) -> Self {
        match scheme {
            StoredScheme::Primary => AuthScheme::Primary,
            StoredScheme::External => AuthScheme::External,
            StoredScheme::Partial => AuthScheme::Partial,
        }
    }
}

pub struct HostAuthCookie;

impl HostAuthCookie {
    /// Clear any existing scheme, then issue the new one. `expires_at`
    /// carries an explicit expiry only when the user asked to be
    /// remembered; `None` leaves the cookie a session cookie.
    pub fn issue(
        jar: PrivateCookieJar,
        token: &str,
        scheme: AuthScheme,
        domain: Option<&str>,
        secure: bool,
        expires_at: Option<time::OffsetDateTime>,
    ) -> PrivateCookieJar {
        let jar = Self::clear(jar);
        let payload = HostAuthPayload {
            token: token.to_string(),
            scheme: scheme.into(),
        };
        let value = serde_json::to_string(&payload).unwrap_or_default();
        let mut cookie = base_cookie(HOST_AUTH_COOKIE, value, domain, secure);
        if let Some(expires_at) = expires_at {
            cookie.set_expires(expires_at);
        }
        jar.add(cookie)
    }

    pub fn read(jar: &PrivateCookieJar) -> Option<(String, AuthScheme)> {
        let cookie = jar.get(HOST_AUTH_COOKIE)?;
        let payload: HostAuthPayload = serde_json::from_str(cookie.value()).ok()?;
        Some((payload.token, payload.scheme.into()))
    }

    pub fn clear(jar: PrivateCookieJar) -> PrivateCookieJar {
        jar.remove(Cookie::from(HOST_AUTH_COOKIE))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Key;

    fn empty_jar() -> PrivateCookieJar {
        PrivateCookieJar::new(Key::generate())
    }

    #[test]
    fn session_id_round_trips() {
        let jar = empty_jar();
        let (jar, id) = SessionId::issue(jar, None, false);
        assert_eq!(SessionId::read(&jar), Some(id));
    }

    #[test]
    fn session_id_clear_removes_cookie() {
        let jar = empty_jar();
        let (jar, _id) = SessionId::issue(jar, None, false);
        let jar = SessionId::clear(jar);
        assert_eq!(SessionId::read(&jar), None);
    }

    #[test]
    fn last_username_round_trips() {
        let jar = empty_jar();
        let jar = LastUserName::set(jar, "alice", None, false);
        assert_eq!(LastUserName::read(&jar), Some("alice".to_string()));
    }

    #[test]
    fn anti_forgery_accepts_matching_token() {
        let jar = empty_jar();
        let (jar, token) = AntiForgery::issue(jar, None, false);
        assert!(AntiForgery::verify(&jar, Some(&token)));
    }

    #[test]
    fn anti_forgery_rejects_mismatched_or_missing_token() {
        let jar = empty_jar();
        let (jar, token) = AntiForgery::issue(jar, None, false);
        assert!(!AntiForgery::verify(&jar, Some("not-the-token")));
        assert!(!AntiForgery::verify(&jar, None));

        let bare_jar = empty_jar();
        assert!(!AntiForgery::verify(&bare_jar, Some(&token)));
    }

    #[test]
    fn constant_time_eq_matches_semantics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn host_auth_cookie_round_trips_token_and_scheme() {
        let jar = empty_jar();
        let jar = HostAuthCookie::issue(jar, "tok-1", AuthScheme::Partial, None, false, None);
        let (token, scheme) = HostAuthCookie::read(&jar).unwrap();
        assert_eq!(token, "tok-1");
        assert_eq!(scheme, AuthScheme::Partial);
    }

    #[test]
    fn host_auth_cookie_issue_replaces_previous_scheme() {
        let jar = empty_jar();
        let jar = HostAuthCookie::issue(jar, "tok-1", AuthScheme::External, None, false, None);
        let jar = HostAuthCookie::issue(jar, "tok-2", AuthScheme::Primary, None, false, None);
        let (token, scheme) = HostAuthCookie::read(&jar).unwrap();
        assert_eq!(token, "tok-2");
        assert_eq!(scheme, AuthScheme::Primary);
    }

    #[test]
    fn host_auth_cookie_clear_removes_it() {
        let jar = empty_jar();
        let jar = HostAuthCookie::issue(jar, "tok-1", AuthScheme::Primary, None, false, None);
        let jar = HostAuthCookie::clear(jar);
        assert!(HostAuthCookie::read(&jar).is_none());
    }
}
