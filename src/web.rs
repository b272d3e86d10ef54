//! HTTP wiring: the admin API behind the authorization middleware, plus an
//! unauthenticated liveness probe.
use crate::authz::identity::{Identity, TokenIdentity};
use crate::authz::middleware::{authorize, AuthzLayerState};
use crate::authz::{self, Enforcer, PolicyAdmin, PolicyStore};
use crate::settings::Settings;
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub enforcer: Arc<Enforcer>,
    pub admin: PolicyAdmin,
    pub identity: Arc<dyn Identity>,
}

impl AppState {
    pub fn new(settings: Settings, db: DatabaseConnection) -> Self {
        let store = PolicyStore::new(db, settings.authz.store_timeout());
        let enforcer = Arc::new(Enforcer::new(store.clone(), settings.authz.reload));
        let admin = PolicyAdmin::new(store, enforcer.clone());
        let identity: Arc<dyn Identity> = Arc::new(TokenIdentity::new(
            settings.identity.token_secret.clone(),
            settings.identity.cookie_name.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            enforcer,
            admin,
            identity,
        }
    }
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

pub fn build_router(state: &AppState) -> Router {
    let layer_state = AuthzLayerState {
        enforcer: state.enforcer.clone(),
        identity: state.identity.clone(),
        login_path: state.settings.authz.login_path.clone(),
    };

    let protected = authz::web::router(state.admin.clone())
        .route_layer(middleware::from_fn_with_state(layer_state, authorize));

    Router::new()
        .route("/healthz", get(health))
        .merge(protected)
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState) -> miette::Result<()> {
    let router = build_router(&state);

    let addr: SocketAddr = format!("{}:{}", state.settings.server.host, state.settings.server.port)
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    tracing::info!(%addr, reload = ?state.enforcer.reload_policy(), "Policy API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
