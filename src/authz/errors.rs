use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::authz::types::{InheritanceEdge, PolicyRule, RoleId, ValidationErrors};

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Policy rule {0} already exists")]
    #[diagnostic(code(rolegate::authz::duplicate_rule))]
    DuplicateRule(PolicyRule),

    #[error("Policy rule {0} does not exist")]
    #[diagnostic(code(rolegate::authz::rule_not_found))]
    RuleNotFound(PolicyRule),

    #[error("Unknown role `{0}`")]
    #[diagnostic(
        code(rolegate::authz::unknown_role),
        help("A role exists once a user is assigned to it or it takes part in inheritance; create it with an initial member first")
    )]
    UnknownRole(RoleId),

    #[error("Role `{0}` already exists")]
    #[diagnostic(
        code(rolegate::authz::role_exists),
        help("Use role assignment to add members to an existing role")
    )]
    RoleAlreadyExists(RoleId),

    #[error("Inheritance edge {0} already exists")]
    #[diagnostic(code(rolegate::authz::duplicate_edge))]
    DuplicateEdge(InheritanceEdge),

    #[error("Inheritance edge {0} does not exist")]
    #[diagnostic(code(rolegate::authz::edge_not_found))]
    EdgeNotFound(InheritanceEdge),

    #[error("Role `{0}` cannot inherit from itself")]
    #[diagnostic(code(rolegate::authz::self_inheritance))]
    SelfInheritance(RoleId),

    #[error("Inheritance edge {0} would create a cycle")]
    #[diagnostic(
        code(rolegate::authz::inheritance_cycle),
        help("Remove the opposite inheritance path before adding this edge")
    )]
    InheritanceCycle(InheritanceEdge),

    #[error("Partial policy update: {old} was deleted but the replacement was not stored ({reason})")]
    #[diagnostic(
        code(rolegate::authz::partial_update),
        help("Recreate the old rule manually; its value is logged at error level")
    )]
    PartialUpdate { old: PolicyRule, reason: String },

    #[error("Validation failed: {0}")]
    #[diagnostic(code(rolegate::authz::validation))]
    Validation(ValidationErrors),

    #[error("Policy store unavailable during {operation}: {reason}")]
    #[diagnostic(
        code(rolegate::authz::store_unavailable),
        help("Check the database connection and `authz.store_timeout_ms`")
    )]
    StoreUnavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("Failed to load policy snapshot: {0}")]
    #[diagnostic(code(rolegate::authz::snapshot_load))]
    SnapshotLoadFailed(String),

    #[error("Invalid policy file, line {line}: {reason}")]
    #[diagnostic(
        code(rolegate::authz::invalid_policy_file),
        help("Records are `p, role, resource, action`, `g, user, role` or `g2, role, inherits_from`")
    )]
    InvalidPolicyFile { line: usize, reason: String },

    #[error("Failed to read policy file `{path}`")]
    #[diagnostic(
        code(rolegate::authz::policy_file_load),
        help("Check `authz.policy_file` in the configuration")
    )]
    PolicyFileLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AuthzError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthzError::DuplicateRule(_)
            | AuthzError::UnknownRole(_)
            | AuthzError::RoleAlreadyExists(_)
            | AuthzError::DuplicateEdge(_)
            | AuthzError::SelfInheritance(_)
            | AuthzError::InheritanceCycle(_)
            | AuthzError::Validation(_)
            | AuthzError::InvalidPolicyFile { .. } => StatusCode::BAD_REQUEST,
            AuthzError::RuleNotFound(_) | AuthzError::EdgeNotFound(_) => StatusCode::NOT_FOUND,
            AuthzError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AuthzError::PartialUpdate { .. }
            | AuthzError::SnapshotLoadFailed(_)
            | AuthzError::PolicyFileLoad { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AuthzError::Validation(errors) => json!(errors),
            AuthzError::PartialUpdate { old, .. } => json!({
                "error": "partial update: old rule deleted, new rule not stored",
                "old_policy": old,
            }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
