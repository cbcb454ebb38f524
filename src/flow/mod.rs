//! Flow controller: the authentication state machine.
//!
//! `AppState` wires together the capability traits every handler depends
//! on. Handlers themselves live in [`handlers`]; this module only holds
//! the shared state, the extra cookie-bound record the external-challenge
//! round trip needs, and the small input-validation gate every handler
//! runs first.

pub mod handlers;

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use serde::{Deserialize, Serialize};

use crate::capabilities::{ClientStore, EventService, HostAuthBridge, UserService};
use crate::config::Config;
use crate::cookies::MessageStore;
use crate::domain::{SignInMessage, SignOutMessage};
use crate::view::ViewService;

/// Stashed across an external-provider round trip, addressed by the CSRF
/// `state` value the provider echoes back to `GET /callback`, so the
/// callback can recover which flow it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalChallengeContext {
    pub signin_id: String,
    pub provider: String,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub user_service: Arc<dyn UserService>,
    pub client_store: Arc<dyn ClientStore>,
    pub event_service: Arc<dyn EventService>,
    pub view_service: Arc<dyn ViewService>,
    pub host_bridge: Arc<dyn HostAuthBridge>,
    pub sign_in_messages: Arc<dyn MessageStore<SignInMessage>>,
    pub sign_out_messages: Arc<dyn MessageStore<SignOutMessage>>,
    pub external_challenges: Arc<dyn MessageStore<ExternalChallengeContext>>,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Input-length gate. Applied to every user-controlled query/form string
/// before it touches a cookie store, a capability call, or an event.
pub fn is_oversize(value: &str, config: &Config) -> bool {
    value.chars().count() > config.max_input_param_length
}
