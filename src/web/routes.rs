use crate::flow::handlers;
use crate::flow::AppState;
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;

async fn healthz_handler() -> &'static str {
    "ok"
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/login", get(handlers::login_get).post(handlers::login_post))
        .route("/external", get(handlers::external_get))
        .route("/callback", get(handlers::callback_get))
        .route("/resume", get(handlers::resume_get))
        .route(
            "/logout",
            get(handlers::logout_get).post(handlers::logout_post),
        )
        .route("/healthz", get(healthz_handler))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::memory::{
        InMemoryClientStore, InMemoryHostAuthBridge, InMemoryUserService, TracingEventService,
    };
    use crate::config::{Config, Environment};
    use crate::cookies::InMemoryStore;
    use crate::view::AskamaViewService;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum_extra::extract::cookie::Key;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState {
            config: Arc::new(Config {
                environment: Environment::Development,
                server_host: "127.0.0.1".into(),
                server_port: 5000,
                base_url: "https://idsvr.test".into(),
                enable_local_login: true,
                enable_sign_out_prompt: true,
                enable_login_hint: true,
                persistent_login_default: false,
                remember_me_duration_secs: 3600,
                max_input_param_length: 100,
                cookie_domain: None,
                cookie_signing_key: "k".repeat(64),
                http_connect_timeout_secs: 1,
                http_request_timeout_secs: 1,
            }),
            user_service: Arc::new(InMemoryUserService::new()),
            client_store: Arc::new(InMemoryClientStore::new()),
            event_service: Arc::new(TracingEventService::new()),
            view_service: Arc::new(AskamaViewService::new()),
            host_bridge: Arc::new(InMemoryHostAuthBridge::new()),
            sign_in_messages: Arc::new(InMemoryStore::new()),
            sign_out_messages: Arc::new(InMemoryStore::new()),
            external_challenges: Arc::new(InMemoryStore::new()),
            cookie_key: Key::generate(),
        }
    }

    #[tokio::test]
    async fn healthz_is_routed_through_the_full_router() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_signin_on_login_returns_bad_request() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/login?signin=nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
