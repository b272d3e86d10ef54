use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use axum::http::Method;

/// Authenticated caller identifier.
///
/// A user id never contains `:`, which keeps it disjoint from the tagged
/// form of any role in the shared relation table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err("user id must not be empty".into());
        }
        if value.trim() != value {
            return Err("user id must not have surrounding whitespace".into());
        }
        if value.contains(':') {
            return Err("user id must not contain ':'".into());
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        UserId::parse(raw).map_err(serde::de::Error::custom)
    }
}

/// Bare (untagged) role name. Case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    pub fn parse(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err("role must not be empty".into());
        }
        if value.trim() != value {
            return Err("role must not have surrounding whitespace".into());
        }
        if value.contains(':') {
            return Err("role must not contain ':'".into());
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RoleId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        RoleId::parse(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// Fixed verb table. Any other verb has no action and can never be
    /// granted by a rule.
    pub fn from_method(method: &Method) -> Option<Self> {
        match method.as_str() {
            "GET" => Some(Action::Read),
            "POST" => Some(Action::Create),
            "PUT" => Some(Action::Update),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(format!(
                "unknown action `{other}` (expected create, read, update or delete)"
            )),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized path identifying a protected endpoint group, e.g. `/api/users`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Resource(String);

impl Resource {
    pub fn parse(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        if !value.starts_with('/') {
            return Err("resource must be a path starting with '/'".into());
        }
        if value.chars().any(char::is_whitespace) {
            return Err("resource must not contain whitespace".into());
        }
        Ok(Self(value))
    }

    /// Derive the resource for a request path: a single trailing segment is
    /// dropped iff it is purely numeric, so `/users/42` and `/users` share
    /// one resource.
    pub fn from_request_path(path: &str) -> Self {
        let normalized = match path.rsplit_once('/') {
            Some((head, last)) if !last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()) => {
                head
            }
            _ => path,
        };
        if normalized.is_empty() {
            Self("/".to_string())
        } else {
            Self(normalized.to_string())
        }
    }

    /// Decode a resource carried in a URL path segment.
    pub fn from_slug(slug: &str) -> Result<Self, String> {
        Self::parse(unslugify(slug))
    }

    pub fn slug(&self) -> String {
        slugify(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Resource::parse(raw).map_err(serde::de::Error::custom)
    }
}

/// `/api/users` -> `-api-users`. Lossless only for resources without `-`.
pub fn slugify(resource: &str) -> String {
    resource.replace('/', "-")
}

pub fn unslugify(slug: &str) -> String {
    slug.replace('-', "/")
}

/// A `(role, resource, action)` permission grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub role: RoleId,
    pub resource: Resource,
    pub action: Action,
}

impl std::fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.role, self.resource, self.action)
    }
}

/// Rules sharing `(role, resource)` folded into one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedRule {
    pub role: RoleId,
    pub resource: Resource,
    pub action: Vec<Action>,
}

/// `role` inherits every permission granted to `inherits_from`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InheritanceEdge {
    pub role: RoleId,
    pub inherits_from: RoleId,
}

impl std::fmt::Display for InheritanceEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.role, self.inherits_from)
    }
}

/// Per-field validation problems, serialized as
/// `{"validation_errors": {"field": ["problem"]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub validation_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, problem: impl Into<String>) {
        self.validation_errors
            .entry(field.into())
            .or_default()
            .push(problem.into());
    }

    pub fn is_empty(&self) -> bool {
        self.validation_errors.is_empty()
    }

    fn required<T>(
        &mut self,
        field: &str,
        value: Option<&str>,
        parse: impl FnOnce(String) -> Result<T, String>,
    ) -> Option<T> {
        match value {
            None | Some("") => {
                self.add(field, "non zero value required");
                None
            }
            Some(raw) => match parse(raw.to_string()) {
                Ok(v) => Some(v),
                Err(problem) => {
                    self.add(field, problem);
                    None
                }
            },
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, problems) in &self.validation_errors {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", problems.join(", "))?;
        }
        Ok(())
    }
}

// ---------- API request types ----------
//
// Bodies arrive as loosely typed strings so that every field problem can be
// reported at once instead of failing on the first bad field.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyRuleRequest {
    pub role: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
}

impl PolicyRuleRequest {
    pub fn validate(&self) -> Result<PolicyRule, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let rule = self.validate_into(&mut errors, "");
        match rule {
            Some(rule) if errors.is_empty() => Ok(rule),
            _ => Err(errors),
        }
    }

    fn validate_into(&self, errors: &mut ValidationErrors, prefix: &str) -> Option<PolicyRule> {
        let role = errors.required(&format!("{prefix}role"), self.role.as_deref(), RoleId::parse);
        let resource = errors.required(
            &format!("{prefix}resource"),
            self.resource.as_deref(),
            Resource::parse,
        );
        let action = errors.required(&format!("{prefix}action"), self.action.as_deref(), |s| {
            s.parse::<Action>()
        });
        Some(PolicyRule {
            role: role?,
            resource: resource?,
            action: action?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRuleRequest {
    #[serde(default)]
    pub old_policy: Option<PolicyRuleRequest>,
    #[serde(default)]
    pub new_policy: Option<PolicyRuleRequest>,
}

impl UpdateRuleRequest {
    pub fn validate(&self) -> Result<(PolicyRule, PolicyRule), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let old = match &self.old_policy {
            Some(p) => p.validate_into(&mut errors, "old_policy."),
            None => {
                errors.add("old_policy", "non zero value required");
                None
            }
        };
        let new = match &self.new_policy {
            Some(p) => p.validate_into(&mut errors, "new_policy."),
            None => {
                errors.add("new_policy", "non zero value required");
                None
            }
        };
        match (old, new) {
            (Some(old), Some(new)) if errors.is_empty() => Ok((old, new)),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleAssignmentRequest {
    pub user_id: Option<String>,
    pub role: Option<String>,
}

impl RoleAssignmentRequest {
    pub fn validate(&self) -> Result<(UserId, RoleId), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let user = errors.required("user_id", self.user_id.as_deref(), UserId::parse);
        let role = errors.required("role", self.role.as_deref(), RoleId::parse);
        match (user, role) {
            (Some(user), Some(role)) if errors.is_empty() => Ok((user, role)),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InheritanceRequest {
    pub role: Option<String>,
    pub inherits_from: Option<String>,
}

impl InheritanceRequest {
    pub fn validate(&self) -> Result<InheritanceEdge, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let role = errors.required("role", self.role.as_deref(), RoleId::parse);
        let inherits_from =
            errors.required("inherits_from", self.inherits_from.as_deref(), RoleId::parse);
        match (role, inherits_from) {
            (Some(role), Some(inherits_from)) if errors.is_empty() => Ok(InheritanceEdge {
                role,
                inherits_from,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

// ---------- API response types ----------

#[derive(Debug, Serialize)]
pub struct UserRoleResponse {
    pub user_id: UserId,
    pub role: Option<RoleId>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rejects_tag_separator() {
        assert!(UserId::parse("42").is_ok());
        assert!(UserId::parse("role:admin").is_err());
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse(" 42").is_err());
    }

    #[test]
    fn test_role_id_parse() {
        let r = RoleId::parse("moderator").unwrap();
        assert_eq!(r.as_str(), "moderator");
        assert!(RoleId::parse("role:moderator").is_err());
        assert!(RoleId::parse("   ").is_err());
    }

    #[test]
    fn test_action_from_method() {
        assert_eq!(Action::from_method(&Method::GET), Some(Action::Read));
        assert_eq!(Action::from_method(&Method::POST), Some(Action::Create));
        assert_eq!(Action::from_method(&Method::PUT), Some(Action::Update));
        assert_eq!(Action::from_method(&Method::DELETE), Some(Action::Delete));
        assert_eq!(Action::from_method(&Method::PATCH), None);
        assert_eq!(Action::from_method(&Method::HEAD), None);
        assert_eq!(Action::from_method(&Method::OPTIONS), None);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("read".parse::<Action>().unwrap(), Action::Read);
        assert!("READ".parse::<Action>().is_err());
        assert!("GET".parse::<Action>().is_err());
    }

    #[test]
    fn test_resource_from_request_path() {
        assert_eq!(Resource::from_request_path("/users/42").as_str(), "/users");
        assert_eq!(Resource::from_request_path("/users").as_str(), "/users");
        assert_eq!(
            Resource::from_request_path("/api/v1/posts/7").as_str(),
            "/api/v1/posts"
        );
        // only one trailing segment is stripped
        assert_eq!(Resource::from_request_path("/users/4/2").as_str(), "/users/4");
        // non-numeric ids are part of the resource
        assert_eq!(Resource::from_request_path("/users/abc").as_str(), "/users/abc");
        assert_eq!(Resource::from_request_path("/users/-1").as_str(), "/users/-1");
        assert_eq!(Resource::from_request_path("/users/").as_str(), "/users/");
        assert_eq!(Resource::from_request_path("/42").as_str(), "/");
    }

    #[test]
    fn test_slug_round_trip() {
        for r in ["/users", "/api/v1/users", "/", "/admin/policy/roles"] {
            assert_eq!(unslugify(&slugify(r)), r);
        }
        let res = Resource::parse("/api/users").unwrap();
        assert_eq!(res.slug(), "-api-users");
        assert_eq!(Resource::from_slug("-api-users").unwrap(), res);
    }

    #[test]
    fn test_slug_is_lossy_for_dashes() {
        assert_ne!(unslugify(&slugify("/user-groups")), "/user-groups");
    }

    #[test]
    fn test_policy_rule_request_collects_all_problems() {
        let req = PolicyRuleRequest {
            role: None,
            resource: Some("users".into()),
            action: Some("GET".into()),
        };
        let errs = req.validate().unwrap_err();
        assert_eq!(errs.validation_errors.len(), 3);
        assert!(errs.validation_errors.contains_key("role"));
        assert!(errs.validation_errors.contains_key("resource"));
        assert!(errs.validation_errors.contains_key("action"));
    }

    #[test]
    fn test_update_request_prefixes_fields() {
        let req = UpdateRuleRequest {
            old_policy: Some(PolicyRuleRequest {
                role: Some("admin".into()),
                resource: Some("/users".into()),
                action: Some("read".into()),
            }),
            new_policy: None,
        };
        let errs = req.validate().unwrap_err();
        assert!(errs.validation_errors.contains_key("new_policy"));
        assert!(!errs.validation_errors.contains_key("old_policy.role"));
    }

    #[test]
    fn test_validation_errors_serialize_shape() {
        let mut errs = ValidationErrors::default();
        errs.add("role", "non zero value required");
        let v = serde_json::to_value(&errs).unwrap();
        assert_eq!(
            v,
            serde_json::json!({ "validation_errors": { "role": ["non zero value required"] } })
        );
    }
}
