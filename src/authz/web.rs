use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::authz::admin::PolicyAdmin;
use crate::authz::errors::AuthzError;
use crate::authz::types::{
    InheritanceRequest, MessageResponse, PolicyRuleRequest, Resource, RoleAssignmentRequest,
    SearchQuery, UpdateRuleRequest, UserId, UserRoleResponse, ValidationErrors,
};

/// JSON administration API. Mount it behind the authorization middleware.
pub fn router(admin: PolicyAdmin) -> Router {
    Router::new()
        .route(
            "/api/auth",
            get(find_all_rules)
                .post(create_rule)
                .put(update_rule)
                .delete(delete_rule),
        )
        .route(
            "/api/auth/roles",
            get(find_all_roles).put(assign_role).post(create_role),
        )
        .route(
            "/api/auth/roles/{user_id}",
            get(find_role_for_user).delete(remove_user_roles),
        )
        .route(
            "/api/auth/inheritance",
            get(find_all_inheritance)
                .post(create_inheritance)
                .delete(delete_inheritance),
        )
        .route("/api/auth/{resource}", get(find_rules_for_resource))
        .with_state(admin)
}

fn field_error(field: &str, problem: &str) -> AuthzError {
    let mut errors = ValidationErrors::default();
    errors.add(field, problem);
    AuthzError::Validation(errors)
}

fn path_user(raw: &str) -> Result<UserId, AuthzError> {
    UserId::parse(raw).map_err(|e| field_error("user_id", &e))
}

async fn find_all_rules(
    State(admin): State<PolicyAdmin>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AuthzError> {
    let rules = admin.find_all_rules(query.search.as_deref()).await?;
    Ok(Json(rules))
}

/// `/api/auth/-api-users` looks up `/api/users`. Resources that contain a
/// literal `-` do not survive the slug decoding and are only reachable
/// through `GET /api/auth?search=`.
async fn find_rules_for_resource(
    State(admin): State<PolicyAdmin>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AuthzError> {
    if slug.trim().is_empty() {
        return Err(field_error("resource", "non zero value required"));
    }
    let resource = Resource::from_slug(&slug).map_err(|e| field_error("resource", &e))?;
    let rules = admin.find_rules_for_resource(&resource).await?;
    Ok(Json(rules))
}

async fn create_rule(
    State(admin): State<PolicyAdmin>,
    Json(req): Json<PolicyRuleRequest>,
) -> Result<impl IntoResponse, AuthzError> {
    let rule = req.validate().map_err(AuthzError::Validation)?;
    admin.create_rule(&rule).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn update_rule(
    State(admin): State<PolicyAdmin>,
    Json(req): Json<UpdateRuleRequest>,
) -> Result<impl IntoResponse, AuthzError> {
    let (old, new) = req.validate().map_err(AuthzError::Validation)?;
    admin.update_rule(&old, &new).await?;
    Ok(Json(new))
}

async fn delete_rule(
    State(admin): State<PolicyAdmin>,
    Json(req): Json<PolicyRuleRequest>,
) -> Result<impl IntoResponse, AuthzError> {
    let rule = req.validate().map_err(AuthzError::Validation)?;
    admin.delete_rule(&rule).await?;
    Ok(Json(MessageResponse {
        message: "Deletion successful".into(),
    }))
}

async fn find_all_roles(State(admin): State<PolicyAdmin>) -> Result<impl IntoResponse, AuthzError> {
    let roles: Vec<_> = admin.find_all_roles().await?.into_iter().collect();
    Ok(Json(roles))
}

async fn find_role_for_user(
    State(admin): State<PolicyAdmin>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AuthzError> {
    let user = path_user(&user_id)?;
    let role = admin.find_role_for_user(&user).await?;
    Ok(Json(UserRoleResponse {
        user_id: user,
        role,
    }))
}

async fn assign_role(
    State(admin): State<PolicyAdmin>,
    Json(req): Json<RoleAssignmentRequest>,
) -> Result<impl IntoResponse, AuthzError> {
    let (user, role) = req.validate().map_err(AuthzError::Validation)?;
    admin.assign_role(&user, &role).await?;
    Ok(Json(UserRoleResponse {
        user_id: user,
        role: Some(role),
    }))
}

async fn create_role(
    State(admin): State<PolicyAdmin>,
    Json(req): Json<RoleAssignmentRequest>,
) -> Result<impl IntoResponse, AuthzError> {
    let (user, role) = req.validate().map_err(AuthzError::Validation)?;
    admin.create_role(&user, &role).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserRoleResponse {
            user_id: user,
            role: Some(role),
        }),
    ))
}

async fn remove_user_roles(
    State(admin): State<PolicyAdmin>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AuthzError> {
    let user = path_user(&user_id)?;
    admin.remove_user_roles(&user).await?;
    Ok(Json(MessageResponse {
        message: "Deletion successful".into(),
    }))
}

async fn find_all_inheritance(
    State(admin): State<PolicyAdmin>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AuthzError> {
    let edges: Vec<_> = admin
        .find_all_inheritance(query.search.as_deref())
        .await?
        .into_iter()
        .collect();
    Ok(Json(edges))
}

async fn create_inheritance(
    State(admin): State<PolicyAdmin>,
    Json(req): Json<InheritanceRequest>,
) -> Result<impl IntoResponse, AuthzError> {
    let edge = req.validate().map_err(AuthzError::Validation)?;
    admin.create_inheritance(&edge).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn delete_inheritance(
    State(admin): State<PolicyAdmin>,
    Json(req): Json<InheritanceRequest>,
) -> Result<impl IntoResponse, AuthzError> {
    let edge = req.validate().map_err(AuthzError::Validation)?;
    admin.delete_inheritance(&edge).await?;
    Ok(Json(MessageResponse {
        message: "Deletion successful".into(),
    }))
}
