use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde_json::json;

use crate::authz::enforcer::Enforcer;
use crate::authz::identity::Identity;
use crate::authz::types::{Action, Resource};

/// State for [`authorize`]; attach with `middleware::from_fn_with_state`.
#[derive(Clone)]
pub struct AuthzLayerState {
    pub enforcer: Arc<Enforcer>,
    pub identity: Arc<dyn Identity>,
    pub login_path: String,
}

/// Per-request allow/deny. On success the caller's `UserId` is available to
/// handlers as a request extension.
pub async fn authorize(
    State(state): State<AuthzLayerState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let resource = Resource::from_request_path(&path);
    let action = Action::from_method(request.method());

    let user = match state.identity.authenticate(request.headers()).await {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!(%path, error = %e, "Authentication failed");
            return unauthenticated(&state.login_path, &path);
        }
    };

    let Some(action) = action else {
        tracing::info!(
            user = %user,
            method = %request.method(),
            %resource,
            "Denied: method has no action"
        );
        return forbidden("Not authorized to perform that action");
    };

    if !state.enforcer.allowed(&user, &resource, action).await {
        tracing::info!(user = %user, %resource, %action, "Denied");
        return forbidden("Not authorized to perform that action");
    }

    request.extensions_mut().insert(user);
    next.run(request).await
}

fn unauthenticated(login_path: &str, path: &str) -> Response {
    if path.split('/').nth(1) == Some("admin") {
        let target = format!("{login_path}?return_to={}", urlencoding::encode(path));
        return Redirect::to(&target).into_response();
    }
    forbidden("Error parsing authentication token")
}

fn forbidden(message: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
}
