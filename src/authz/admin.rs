use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::authz::enforcer::Enforcer;
use crate::authz::errors::AuthzError;
use crate::authz::graph::RoleGraph;
use crate::authz::namespace::Relation;
use crate::authz::store::PolicyStore;
use crate::authz::types::{
    Action, CombinedRule, InheritanceEdge, PolicyRule, Resource, RoleId, UserId,
};

/// Validated CRUD over rules, role assignments and inheritance edges.
///
/// Preconditions are checked against a freshly loaded graph. After every
/// successful mutation the enforcer is invalidated so cached decisions
/// never outlive the write.
#[derive(Clone)]
pub struct PolicyAdmin {
    store: PolicyStore,
    enforcer: Arc<Enforcer>,
}

impl PolicyAdmin {
    pub fn new(store: PolicyStore, enforcer: Arc<Enforcer>) -> Self {
        Self { store, enforcer }
    }

    pub fn enforcer(&self) -> &Arc<Enforcer> {
        &self.enforcer
    }

    async fn graph(&self) -> Result<RoleGraph, AuthzError> {
        RoleGraph::build(&self.store.load().await?)
    }

    // ---------- rules ----------

    pub async fn create_rule(&self, rule: &PolicyRule) -> Result<(), AuthzError> {
        if self.store.rule_exists(rule).await? {
            return Err(AuthzError::DuplicateRule(rule.clone()));
        }
        if !self.store.insert_rule(rule).await? {
            return Err(AuthzError::DuplicateRule(rule.clone()));
        }
        self.enforcer.invalidate().await;
        tracing::info!(%rule, "Created policy rule");
        Ok(())
    }

    pub async fn delete_rule(&self, rule: &PolicyRule) -> Result<(), AuthzError> {
        if !self.store.delete_rule(rule).await? {
            return Err(AuthzError::RuleNotFound(rule.clone()));
        }
        self.enforcer.invalidate().await;
        tracing::info!(%rule, "Deleted policy rule");
        Ok(())
    }

    pub async fn update_rule(&self, old: &PolicyRule, new: &PolicyRule) -> Result<(), AuthzError> {
        if !self.store.rule_exists(old).await? {
            return Err(AuthzError::RuleNotFound(old.clone()));
        }
        if old == new {
            return Ok(());
        }
        if self.store.rule_exists(new).await? {
            return Err(AuthzError::DuplicateRule(new.clone()));
        }

        self.store.replace_rule(old, new).await?;
        self.enforcer.invalidate().await;
        tracing::info!(%old, %new, "Updated policy rule");
        Ok(())
    }

    /// All rules grouped by `(role, resource)`, optionally filtered by a
    /// case-insensitive substring of the resource, sorted by resource.
    pub async fn find_all_rules(&self, search: Option<&str>) -> Result<Vec<CombinedRule>, AuthzError> {
        let graph = self.graph().await?;
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        Ok(combine(graph.rules().iter().filter(|rule| match &needle {
            Some(n) => rule.resource.as_str().to_lowercase().contains(n),
            None => true,
        })))
    }

    pub async fn find_rules_for_resource(&self, resource: &Resource) -> Result<Vec<CombinedRule>, AuthzError> {
        let graph = self.graph().await?;
        Ok(combine(
            graph.rules().iter().filter(|rule| &rule.resource == resource),
        ))
    }

    // ---------- roles ----------

    pub async fn find_all_roles(&self) -> Result<BTreeSet<RoleId>, AuthzError> {
        Ok(self.graph().await?.all_roles())
    }

    pub async fn find_role_for_user(&self, user: &UserId) -> Result<Option<RoleId>, AuthzError> {
        Ok(self.graph().await?.roles_of(user))
    }

    /// Give `user` exactly one role, replacing any previous assignment.
    pub async fn assign_role(&self, user: &UserId, role: &RoleId) -> Result<(), AuthzError> {
        if !self.graph().await?.role_exists(role) {
            return Err(AuthzError::UnknownRole(role.clone()));
        }
        self.store.replace_user_role(user, role).await?;
        self.enforcer.invalidate().await;
        tracing::info!(user = %user, role = %role, "Assigned role");
        Ok(())
    }

    /// Bring a new role into existence with `user` as its first member.
    pub async fn create_role(&self, user: &UserId, role: &RoleId) -> Result<(), AuthzError> {
        if self.graph().await?.role_exists(role) {
            return Err(AuthzError::RoleAlreadyExists(role.clone()));
        }
        self.store.replace_user_role(user, role).await?;
        self.enforcer.invalidate().await;
        tracing::info!(user = %user, role = %role, "Created role");
        Ok(())
    }

    /// Idempotent: a user without roles is not an error.
    pub async fn remove_user_roles(&self, user: &UserId) -> Result<(), AuthzError> {
        let removed = self.store.delete_user_edges(user).await?;
        if removed > 0 {
            self.enforcer.invalidate().await;
            tracing::info!(user = %user, removed, "Removed user roles");
        }
        Ok(())
    }

    // ---------- inheritance ----------

    pub async fn find_all_inheritance(&self, search: Option<&str>) -> Result<BTreeSet<InheritanceEdge>, AuthzError> {
        let graph = self.graph().await?;
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        Ok(graph
            .inheritance_edges()
            .into_iter()
            .filter(|edge| match &needle {
                Some(n) => {
                    edge.role.as_str().to_lowercase().contains(n)
                        || edge.inherits_from.as_str().to_lowercase().contains(n)
                }
                None => true,
            })
            .collect())
    }

    pub async fn create_inheritance(&self, edge: &InheritanceEdge) -> Result<(), AuthzError> {
        let graph = self.graph().await?;

        for role in [&edge.role, &edge.inherits_from] {
            if !graph.role_exists(role) {
                return Err(AuthzError::UnknownRole(role.clone()));
            }
        }
        if edge.role == edge.inherits_from {
            return Err(AuthzError::SelfInheritance(edge.role.clone()));
        }
        if graph.has_inheritance(edge) {
            return Err(AuthzError::DuplicateEdge(edge.clone()));
        }
        if graph.would_create_cycle(&edge.role, &edge.inherits_from) {
            return Err(AuthzError::InheritanceCycle(edge.clone()));
        }

        if !self
            .store
            .insert_edge(&Relation::Inheritance(edge.clone()))
            .await?
        {
            return Err(AuthzError::DuplicateEdge(edge.clone()));
        }
        self.enforcer.invalidate().await;
        tracing::info!(%edge, "Created role inheritance");
        Ok(())
    }

    pub async fn delete_inheritance(&self, edge: &InheritanceEdge) -> Result<(), AuthzError> {
        if !self
            .store
            .delete_edge(&Relation::Inheritance(edge.clone()))
            .await?
        {
            return Err(AuthzError::EdgeNotFound(edge.clone()));
        }
        self.enforcer.invalidate().await;
        tracing::info!(%edge, "Deleted role inheritance");
        Ok(())
    }
}

/// Fold rules sharing `(role, resource)` into one record, sorted by
/// resource then role.
fn combine<'a>(rules: impl Iterator<Item = &'a PolicyRule>) -> Vec<CombinedRule> {
    let mut grouped: BTreeMap<(Resource, RoleId), BTreeSet<Action>> = BTreeMap::new();
    for rule in rules {
        grouped
            .entry((rule.resource.clone(), rule.role.clone()))
            .or_default()
            .insert(rule.action);
    }
    grouped
        .into_iter()
        .map(|((resource, role), actions)| CombinedRule {
            role,
            resource,
            action: actions.into_iter().collect(),
        })
        .collect()
}
