use rolegate::authz::namespace::Relation;
use rolegate::authz::types::{Action, InheritanceEdge, PolicyRule, Resource, RoleId, UserId};
use rolegate::authz::PolicyStore;

pub fn role(name: &str) -> RoleId {
    RoleId::parse(name).expect("valid role")
}

pub fn user(id: &str) -> UserId {
    UserId::parse(id).expect("valid user id")
}

pub fn resource(path: &str) -> Resource {
    Resource::parse(path).expect("valid resource")
}

pub fn rule(role_name: &str, path: &str, action: Action) -> PolicyRule {
    PolicyRule {
        role: role(role_name),
        resource: resource(path),
        action,
    }
}

pub fn edge(from: &str, to: &str) -> InheritanceEdge {
    InheritanceEdge {
        role: role(from),
        inherits_from: role(to),
    }
}

/// Builder for writing policy straight into the store.
///
/// Bypasses the admin service preconditions, so it can also lay down states
/// the service would refuse (cycles, inheritance-only roles).
#[derive(Default)]
pub struct PolicyBuilder {
    rules: Vec<PolicyRule>,
    relations: Vec<Relation>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, role_name: &str, path: &str, action: Action) -> Self {
        self.rules.push(rule(role_name, path, action));
        self
    }

    pub fn assign(mut self, user_id: &str, role_name: &str) -> Self {
        self.relations.push(Relation::Assignment {
            user: user(user_id),
            role: role(role_name),
        });
        self
    }

    pub fn inherit(mut self, from: &str, to: &str) -> Self {
        self.relations.push(Relation::Inheritance(edge(from, to)));
        self
    }

    pub async fn apply(self, store: &PolicyStore) {
        for rule in &self.rules {
            store.insert_rule(rule).await.expect("Failed to insert rule");
        }
        for relation in &self.relations {
            store
                .insert_edge(relation)
                .await
                .expect("Failed to insert edge");
        }
    }
}
