//! Storage encoding for the shared relation table.
//!
//! Users and roles are nodes in one edge table (`role_edges`). Roles are
//! stored with the `role:` tag, users are stored raw. Because [`UserId`]
//! rejects `:`, no user id can ever decode as a role. Outside this module
//! roles are always handled as bare [`RoleId`]s.

use crate::authz::errors::AuthzError;
use crate::authz::types::{InheritanceEdge, RoleId, UserId};

pub const ROLE_PREFIX: &str = "role:";

pub fn tag(role: &str) -> String {
    format!("{ROLE_PREFIX}{role}")
}

pub fn untag(value: &str) -> &str {
    value.strip_prefix(ROLE_PREFIX).unwrap_or(value)
}

pub fn is_tagged(value: &str) -> bool {
    value.starts_with(ROLE_PREFIX)
}

/// Source endpoint of an edge in the shared relation table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    User(UserId),
    Role(RoleId),
}

impl Subject {
    pub fn encode(&self) -> String {
        match self {
            Subject::User(user) => user.as_str().to_string(),
            Subject::Role(role) => tag(role.as_str()),
        }
    }

    pub fn decode(raw: &str) -> Result<Self, String> {
        if is_tagged(raw) {
            RoleId::parse(untag(raw)).map(Subject::Role)
        } else {
            UserId::parse(raw).map(Subject::User)
        }
    }
}

impl From<UserId> for Subject {
    fn from(user: UserId) -> Self {
        Subject::User(user)
    }
}

impl From<RoleId> for Subject {
    fn from(role: RoleId) -> Self {
        Subject::Role(role)
    }
}

/// A decoded row of the relation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    Assignment { user: UserId, role: RoleId },
    Inheritance(InheritanceEdge),
}

impl Relation {
    /// Stored `(source, target)` pair.
    pub fn encode(&self) -> (String, String) {
        match self {
            Relation::Assignment { user, role } => {
                (user.as_str().to_string(), tag(role.as_str()))
            }
            Relation::Inheritance(edge) => {
                (tag(edge.role.as_str()), tag(edge.inherits_from.as_str()))
            }
        }
    }

    pub fn decode(source: &str, target: &str) -> Result<Self, AuthzError> {
        if !is_tagged(target) {
            return Err(AuthzError::SnapshotLoadFailed(format!(
                "edge `{source}` -> `{target}` does not point at a role"
            )));
        }
        let role = RoleId::parse(untag(target)).map_err(|e| {
            AuthzError::SnapshotLoadFailed(format!("invalid role in edge target `{target}`: {e}"))
        })?;
        let subject = Subject::decode(source).map_err(|e| {
            AuthzError::SnapshotLoadFailed(format!("invalid edge source `{source}`: {e}"))
        })?;
        Ok(match subject {
            Subject::User(user) => Relation::Assignment { user, role },
            Subject::Role(from) => Relation::Inheritance(InheritanceEdge {
                role: from,
                inherits_from: role,
            }),
        })
    }
}
