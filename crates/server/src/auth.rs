use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::debug;

use invoicer_core::config::AppConfig;
use invoicer_core::search::{Location, SearchParams};
use invoicer_core::{AccessDecision, RouteGuard};

pub const CALLBACK_PARAM: &str = "callbackUrl";

/// Session check applied in front of the dashboard and login pages.
#[derive(Clone)]
pub struct SessionGate {
    guard: RouteGuard,
    cookie_name: Arc<str>,
    session_token: SecretString,
}

impl SessionGate {
    pub fn new(guard: RouteGuard, cookie_name: &str, session_token: SecretString) -> Self {
        Self { guard, cookie_name: Arc::from(cookie_name), session_token }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.dashboard.route_guard(),
            &config.auth.session_cookie,
            config.auth.session_token.clone(),
        )
    }

    pub fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        let expected = self.session_token.expose_secret();
        !expected.is_empty()
            && session_cookie(headers, &self.cookie_name).is_some_and(|presented| {
                bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
            })
    }

    fn login_redirect(&self, path: &str) -> String {
        let mut params = SearchParams::default();
        params.set(CALLBACK_PARAM, path);
        Location { pathname: self.guard.login_path().to_string(), params }.href()
    }
}

pub async fn require_session(
    State(gate): State<SessionGate>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let authenticated = gate.is_authenticated(request.headers());

    match gate.guard.authorize(authenticated, &path) {
        AccessDecision::Allow => next.run(request).await,
        AccessDecision::Deny => {
            debug!(
                event_name = "dashboard.auth.denied",
                correlation_id = "auth",
                path = %path,
                "unauthenticated request to protected path"
            );
            Redirect::to(&gate.login_redirect(&path)).into_response()
        }
        AccessDecision::Redirect(target) => Redirect::to(&target).into_response(),
    }
}

fn session_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use invoicer_core::RouteGuard;

    use super::{require_session, SessionGate};

    const TOKEN: &str = "test-session-token-0001";

    fn app() -> Router {
        let gate = SessionGate::new(RouteGuard::default(), "invoicer_session", TOKEN.to_string().into());
        Router::new()
            .route("/dashboard/invoices", get(|| async { "invoices" }))
            .route("/login", get(|| async { "login" }))
            .route("/dashboards", get(|| async { "lookalike" }))
            .layer(middleware::from_fn_with_state(gate, require_session))
    }

    fn get_request(path: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).expect("request")
    }

    fn location(response: &axum::response::Response) -> Option<&str> {
        response.headers().get(header::LOCATION).and_then(|value| value.to_str().ok())
    }

    #[tokio::test]
    async fn anonymous_request_to_dashboard_is_sent_to_login_with_callback() {
        let response =
            app().oneshot(get_request("/dashboard/invoices", None)).await.expect("response");

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), Some("/login?callbackUrl=%2Fdashboard%2Finvoices"));
    }

    #[tokio::test]
    async fn wrong_token_is_treated_as_anonymous() {
        let response = app()
            .oneshot(get_request("/dashboard/invoices", Some("invoicer_session=guess-guess-guess")))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn token_must_match_in_full() {
        let same_length = "test-session-token-0002";
        let truncated = &TOKEN[..TOKEN.len() - 1];
        let extended = format!("{TOKEN}0");

        for presented in [same_length, truncated, extended.as_str()] {
            let cookie = format!("invoicer_session={presented}");
            let response = app()
                .oneshot(get_request("/dashboard/invoices", Some(&cookie)))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "token {presented:?}");
        }
    }

    #[tokio::test]
    async fn signed_in_user_reaches_dashboard_and_is_bounced_from_login() {
        let cookie = format!("theme=dark; invoicer_session={TOKEN}");

        let dashboard = app()
            .oneshot(get_request("/dashboard/invoices", Some(&cookie)))
            .await
            .expect("response");
        assert_eq!(dashboard.status(), StatusCode::OK);

        let login = app().oneshot(get_request("/login", Some(&cookie))).await.expect("response");
        assert_eq!(login.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&login), Some("/dashboard"));
    }

    #[tokio::test]
    async fn anonymous_user_may_open_public_pages() {
        let login = app().oneshot(get_request("/login", None)).await.expect("response");
        assert_eq!(login.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn paths_sharing_the_prefix_are_gated_too() {
        let lookalike = app().oneshot(get_request("/dashboards", None)).await.expect("response");
        assert_eq!(lookalike.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&lookalike), Some("/login?callbackUrl=%2Fdashboards"));
    }
}
