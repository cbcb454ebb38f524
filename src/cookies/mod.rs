//! Cookie-bound message protocol.
//!
//! `MessageStore<T>` is the capability the flow controller depends on to
//! stash a `SignInMessage`/`SignOutMessage` under a random id and read it
//! back later. The production backend is `CookieMessageStore`, an envelope
//! on top of `axum-extra`'s encrypted `PrivateCookieJar`. `InMemoryStore`
//! is a test-only backend — the flow handlers are generic over the trait
//! and never know which one they got.

use std::collections::HashMap;
use std::sync::Mutex;

use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

mod session;
pub use session::{AntiForgery, HostAuthCookie, LastUserName, SessionId};

/// Per-id signed/encrypted cookie envelope, keyed by a short random id
/// (`signInId` / `signOutId`). Reading a cookie under id `X` fails if the
/// envelope's own stored id does not match `X`, even though the cookie
/// *name* already embeds the id — asserted defensively rather than
/// relying on name-matching alone.
pub trait MessageStore<T>: Send + Sync {
    fn put(&self, jar: PrivateCookieJar, id: &str, value: &T) -> PrivateCookieJar;
    fn read(&self, jar: &PrivateCookieJar, id: &str) -> Option<T>;
    fn clear(&self, jar: PrivateCookieJar, id: &str) -> PrivateCookieJar;
}

#[derive(Deserialize)]
struct Envelope<T> {
    id: String,
    value: T,
}

/// Cookie-backed `MessageStore`. `prefix` namespaces the cookie name so
/// `SignInMessage` and `SignOutMessage` never collide under the same id.
pub struct CookieMessageStore {
    prefix: &'static str,
    domain: Option<String>,
    secure: bool,
}

impl CookieMessageStore {
    pub fn new(prefix: &'static str, domain: Option<String>, secure: bool) -> Self {
        Self {
            prefix,
            domain,
            secure,
        }
    }

    fn cookie_name(&self, id: &str) -> String {
        format!("{}.{}", self.prefix, id)
    }
}

impl<T> MessageStore<T> for CookieMessageStore
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn put(&self, jar: PrivateCookieJar, id: &str, value: &T) -> PrivateCookieJar {
        let payload = match serde_json::to_string(&EnvelopeRef { id, value }) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize message cookie payload");
                return jar;
            }
        };

        let mut cookie = Cookie::new(self.cookie_name(id), payload);
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_secure(self.secure);
        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }
        jar.add(cookie)
    }

    fn read(&self, jar: &PrivateCookieJar, id: &str) -> Option<T> {
        let cookie = jar.get(&self.cookie_name(id))?;
        let envelope: Envelope<T> = serde_json::from_str(cookie.value()).ok()?;
        if envelope.id != id {
            tracing::warn!(
                requested_id = %id,
                "message cookie id mismatch, refusing to return payload"
            );
            return None;
        }
        Some(envelope.value)
    }

    fn clear(&self, jar: PrivateCookieJar, id: &str) -> PrivateCookieJar {
        jar.remove(Cookie::from(self.cookie_name(id)))
    }
}

/// Helper used only to serialize a `&T` without needing to clone into an
/// owned `Envelope<T>`.
#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    id: &'a str,
    value: &'a T,
}

/// In-memory `MessageStore`, addressed by id alone (no cookie round trip).
/// Exists so flow-controller tests can drive scenarios without a real
/// signing key or HTTP cookie jar.
#[derive(Default)]
pub struct InMemoryStore<T> {
    values: Mutex<HashMap<String, T>>,
}

impl<T> InMemoryStore<T> {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> MessageStore<T> for InMemoryStore<T>
where
    T: Clone + Send + Sync,
{
    fn put(&self, jar: PrivateCookieJar, id: &str, value: &T) -> PrivateCookieJar {
        self.values
            .lock()
            .expect("in-memory store mutex poisoned")
            .insert(id.to_string(), value.clone());
        jar
    }

    fn read(&self, _jar: &PrivateCookieJar, id: &str) -> Option<T> {
        self.values
            .lock()
            .expect("in-memory store mutex poisoned")
            .get(id)
            .cloned()
    }

    fn clear(&self, jar: PrivateCookieJar, id: &str) -> PrivateCookieJar {
        self.values
            .lock()
            .expect("in-memory store mutex poisoned")
            .remove(id);
        jar
    }
}
