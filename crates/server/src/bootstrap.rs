use std::sync::Arc;

use axum::{middleware, Router};
use invoicer_core::config::{AppConfig, ConfigError, LoadOptions};
use invoicer_db::{connect, migrations, DbPool, SqlCustomerRepository, SqlInvoiceRepository};
use thiserror::Error;
use tower_http::services::ServeDir;
use tracing::info;

use crate::auth::{require_session, SessionGate};
use crate::dashboard::{self, DashboardState};
use crate::health;

const STATIC_DIR: &str = "static";

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Application { config, db_pool })
}

impl Application {
    /// Dashboard pages behind the session gate, plus the ungated health
    /// endpoint and static assets. The gate wraps the dashboard fallback as
    /// well, so every path outside `/health` and `/static` passes the guard.
    pub fn router(&self) -> Router {
        let state = DashboardState::new(
            Arc::new(SqlInvoiceRepository::new(self.db_pool.clone())),
            Arc::new(SqlCustomerRepository::new(self.db_pool.clone())),
            &self.config.dashboard,
        );
        let gate = SessionGate::from_config(&self.config);

        dashboard::router(state)
            .layer(middleware::from_fn_with_state(gate, require_session))
            .merge(health::router(self.db_pool.clone()))
            .nest_service("/static", ServeDir::new(STATIC_DIR))
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use invoicer_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use invoicer_db::{DashboardSeedDataset, SeedResult};
    use tower::ServiceExt;

    use crate::bootstrap::{bootstrap, bootstrap_with_config, Application};

    const TOKEN: &str = "bootstrap-session-token";

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;
        config.auth.session_token = TOKEN.to_string().into();
        config
    }

    async fn seeded_app() -> Application {
        let app = bootstrap_with_config(test_config()).await.expect("bootstrap");
        let seeded: SeedResult = DashboardSeedDataset::load(&app.db_pool).await.expect("seed");
        assert_eq!(seeded.invoices_seeded, 13);
        app
    }

    fn request(method: &str, uri: &str, authenticated: bool) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if authenticated {
            builder = builder.header(header::COOKIE, format!("invoicer_session={TOKEN}"));
        }
        builder.body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_session_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("auth.session_token"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations() {
        let app = bootstrap_with_config(test_config()).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('customers', 'invoices')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 2);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn gated_router_serves_seeded_listing_to_signed_in_users_only() {
        let app = seeded_app().await;

        let anonymous = app
            .router()
            .oneshot(request("GET", "/dashboard/invoices?query=lee", false))
            .await
            .expect("response");
        assert_eq!(anonymous.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            anonymous.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
            Some("/login?callbackUrl=%2Fdashboard%2Finvoices")
        );

        let signed_in = app
            .router()
            .oneshot(request("GET", "/dashboard/invoices?query=lee", true))
            .await
            .expect("response");
        assert_eq!(signed_in.status(), StatusCode::OK);

        let health = app.router().oneshot(request("GET", "/health", false)).await.expect("response");
        assert_eq!(health.status(), StatusCode::OK);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn unrouted_paths_still_pass_the_session_gate() {
        let app = seeded_app().await;

        let root = app.router().oneshot(request("GET", "/", true)).await.expect("response");
        assert_eq!(root.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            root.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
            Some("/dashboard")
        );

        let unknown =
            app.router().oneshot(request("GET", "/nowhere", false)).await.expect("response");
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let protected_unknown = app
            .router()
            .oneshot(request("GET", "/dashboard/nowhere", false))
            .await
            .expect("response");
        assert_eq!(protected_unknown.status(), StatusCode::SEE_OTHER);

        let asset = app
            .router()
            .oneshot(request("GET", "/static/search.js", true))
            .await
            .expect("response");
        assert_ne!(asset.status(), StatusCode::SEE_OTHER);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn deleting_a_seeded_invoice_hits_storage() {
        let app = seeded_app().await;

        let mut delete = request("POST", "/dashboard/invoices/inv-seed-001/delete", true);
        delete.headers_mut().insert(
            header::REFERER,
            "http://localhost:8080/dashboard/invoices?query=rabbit".parse().expect("header"),
        );
        let response = app.router().oneshot(delete).await.expect("response");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let target = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("location")
            .to_string();
        assert_eq!(target, "/dashboard/invoices?query=rabbit");

        let listing = app.router().oneshot(request("GET", &target, true)).await.expect("response");
        let body = axum::body::to_bytes(listing.into_body(), usize::MAX).await.expect("body");
        let html = String::from_utf8_lossy(&body);
        assert!(!html.contains("inv-seed-001"));
        assert!(html.contains("inv-seed-007"));

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&app.db_pool)
            .await
            .expect("count");
        assert_eq!(remaining, 12);

        app.db_pool.close().await;
    }
}
