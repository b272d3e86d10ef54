use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::authz::errors::AuthzError;
use crate::authz::namespace::Relation;
use crate::authz::store::StoredPolicy;
use crate::authz::types::{Action, InheritanceEdge, PolicyRule, Resource, RoleId, UserId};

/// Immutable in-memory projection of the policy store.
///
/// Holds the three relation kinds (rules, assignments, inheritance) decoded
/// out of their storage encoding. Never authoritative: rebuilt from the store
/// whenever the enforcer reloads.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    rules: Vec<PolicyRule>,
    grants: BTreeMap<RoleId, BTreeSet<(Resource, Action)>>,
    assignments: BTreeMap<UserId, BTreeSet<RoleId>>,
    inherits: BTreeMap<RoleId, BTreeSet<RoleId>>,
}

impl RoleGraph {
    /// Decode a stored snapshot. Any row that does not decode makes the whole
    /// snapshot malformed.
    pub fn build(stored: &StoredPolicy) -> Result<Self, AuthzError> {
        let mut graph = RoleGraph::default();

        for row in &stored.rules {
            // stored untagged; a tagged row would not match rule lookups
            let role = RoleId::parse(row.role.as_str()).map_err(|e| {
                AuthzError::SnapshotLoadFailed(format!("rule {}: {e}", row.id))
            })?;
            let resource = Resource::parse(row.resource.clone()).map_err(|e| {
                AuthzError::SnapshotLoadFailed(format!("rule {}: {e}", row.id))
            })?;
            let action = row.action.parse::<Action>().map_err(|e| {
                AuthzError::SnapshotLoadFailed(format!("rule {}: {e}", row.id))
            })?;

            graph
                .grants
                .entry(role.clone())
                .or_default()
                .insert((resource.clone(), action));
            graph.rules.push(PolicyRule {
                role,
                resource,
                action,
            });
        }

        for row in &stored.edges {
            match Relation::decode(&row.source, &row.target)? {
                Relation::Assignment { user, role } => {
                    graph.assignments.entry(user).or_default().insert(role);
                }
                Relation::Inheritance(edge) => {
                    graph
                        .inherits
                        .entry(edge.role)
                        .or_default()
                        .insert(edge.inherits_from);
                }
            }
        }

        Ok(graph)
    }

    /// Whether `user` may perform `action` on `resource` through any role it
    /// holds, directly or by inheritance.
    pub fn allowed(&self, user: &UserId, resource: &Resource, action: Action) -> bool {
        let Some(direct) = self.assignments.get(user) else {
            return false;
        };
        let key = (resource.clone(), action);
        self.reachable(direct.iter())
            .iter()
            .any(|role| self.grants.get(role).is_some_and(|g| g.contains(&key)))
    }

    /// The user's assigned role. Users hold at most one role when managed
    /// through the admin service; for externally seeded data the smallest
    /// role name wins.
    pub fn roles_of(&self, user: &UserId) -> Option<RoleId> {
        self.assignments
            .get(user)
            .and_then(|roles| roles.iter().next().cloned())
    }

    /// Every role referenced by an assignment or inheritance edge.
    pub fn all_roles(&self) -> BTreeSet<RoleId> {
        let mut roles: BTreeSet<RoleId> = self.assignments.values().flatten().cloned().collect();
        for (role, parents) in &self.inherits {
            roles.insert(role.clone());
            roles.extend(parents.iter().cloned());
        }
        roles
    }

    pub fn role_exists(&self, role: &RoleId) -> bool {
        self.assignments.values().any(|roles| roles.contains(role))
            || self.inherits.contains_key(role)
            || self.inherits.values().any(|parents| parents.contains(role))
    }

    pub fn inheritance_edges(&self) -> BTreeSet<InheritanceEdge> {
        self.inherits
            .iter()
            .flat_map(|(role, parents)| {
                parents.iter().map(move |parent| InheritanceEdge {
                    role: role.clone(),
                    inherits_from: parent.clone(),
                })
            })
            .collect()
    }

    pub fn has_inheritance(&self, edge: &InheritanceEdge) -> bool {
        self.inherits
            .get(&edge.role)
            .is_some_and(|parents| parents.contains(&edge.inherits_from))
    }

    /// `role` plus every role it inherits from, transitively.
    pub fn effective_roles(&self, role: &RoleId) -> BTreeSet<RoleId> {
        self.reachable(std::iter::once(role))
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Adding `role -> inherits_from` closes a cycle iff `role` is already
    /// reachable from `inherits_from`.
    pub fn would_create_cycle(&self, role: &RoleId, inherits_from: &RoleId) -> bool {
        self.effective_roles(inherits_from).contains(role)
    }

    fn reachable<'a>(&self, start: impl Iterator<Item = &'a RoleId>) -> BTreeSet<RoleId> {
        let mut visited: HashSet<RoleId> = HashSet::new();
        let mut queue: VecDeque<RoleId> = start.cloned().collect();

        while let Some(role) = queue.pop_front() {
            if !visited.insert(role.clone()) {
                continue;
            }
            if let Some(parents) = self.inherits.get(&role) {
                queue.extend(parents.iter().filter(|p| !visited.contains(*p)).cloned());
            }
        }

        visited.into_iter().collect()
    }
}
