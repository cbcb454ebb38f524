//! Rendering layer. `ViewService` is the capability the flow controller
//! calls to turn a view model into an HTML response; the default
//! implementation renders the four askama templates under `templates/`.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

#[derive(Debug, Clone, Default)]
pub struct LoginViewModel {
    /// The flow's `signInId`, round-tripped in the rendered form action and
    /// external-provider links.
    pub signin_id: String,
    pub client_display_name: Option<String>,
    pub username: Option<String>,
    pub enable_local_login: bool,
    pub enable_login_hint: bool,
    pub remember_me: bool,
    pub external_providers: Vec<String>,
    pub anti_forgery_token: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogoutViewModel {
    pub client_display_name: Option<String>,
    pub anti_forgery_token: String,
    pub sign_out_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoggedOutViewModel {
    pub post_logout_redirect_url: Option<String>,
    pub client_display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ErrorViewModel {
    pub status: u16,
    pub message: String,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    model: LoginViewModel,
}

#[derive(Template)]
#[template(path = "logout.html")]
struct LogoutTemplate {
    model: LogoutViewModel,
}

#[derive(Template)]
#[template(path = "logged_out.html")]
struct LoggedOutTemplate {
    model: LoggedOutViewModel,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    model: ErrorViewModel,
}

fn render(template: impl Template) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "template render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "template error").into_response()
        }
    }
}

/// Rendering capability used by the flow controller. Kept as a trait (not
/// a bare function set) so a deployment can swap in its own brand/theme
/// without touching `crate::flow`.
pub trait ViewService: Send + Sync {
    fn render_login(&self, model: LoginViewModel) -> Response;
    fn render_logout(&self, model: LogoutViewModel) -> Response;
    fn render_logged_out(&self, model: LoggedOutViewModel) -> Response;
    fn render_error(&self, model: ErrorViewModel) -> Response;
}

#[derive(Default)]
pub struct AskamaViewService;

impl AskamaViewService {
    pub fn new() -> Self {
        Self
    }
}

impl ViewService for AskamaViewService {
    fn render_login(&self, model: LoginViewModel) -> Response {
        render(LoginTemplate { model })
    }

    fn render_logout(&self, model: LogoutViewModel) -> Response {
        render(LogoutTemplate { model })
    }

    fn render_logged_out(&self, model: LoggedOutViewModel) -> Response {
        render(LoggedOutTemplate { model })
    }

    fn render_error(&self, model: ErrorViewModel) -> Response {
        let status =
            StatusCode::from_u16(model.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = render(ErrorTemplate { model });
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_view_renders_html() {
        let service = AskamaViewService::new();
        let response = service.render_login(LoginViewModel {
            signin_id: "abc".into(),
            enable_local_login: true,
            anti_forgery_token: "tok".into(),
            ..Default::default()
        });
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn error_view_carries_status_code() {
        let service = AskamaViewService::new();
        let response = service.render_error(ErrorViewModel {
            status: 400,
            message: "bad request".into(),
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
