use std::future::Future;
use std::time::Duration;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};

use crate::authz::errors::AuthzError;
use crate::authz::namespace::Relation;
use crate::authz::types::{PolicyRule, RoleId, UserId};
use crate::entities::{policy_rule, role_edge};

/// Raw rows of both relation kinds, as read in one load.
#[derive(Debug, Clone, Default)]
pub struct StoredPolicy {
    pub rules: Vec<policy_rule::Model>,
    pub edges: Vec<role_edge::Model>,
}

/// Durable tuple storage for rules and the shared role relation table.
///
/// Every call is bounded by `timeout`; expiry surfaces as
/// [`AuthzError::StoreUnavailable`] rather than blocking the caller.
#[derive(Clone, Debug)]
pub struct PolicyStore {
    db: DatabaseConnection,
    timeout: Duration,
}

impl PolicyStore {
    pub fn new(db: DatabaseConnection, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn load(&self) -> Result<StoredPolicy, AuthzError> {
        self.bounded("load", async {
            let rules = policy_rule::Entity::find()
                .order_by_asc(policy_rule::Column::Id)
                .all(&self.db)
                .await
                .map_err(db_err("load"))?;
            let edges = role_edge::Entity::find()
                .order_by_asc(role_edge::Column::Id)
                .all(&self.db)
                .await
                .map_err(db_err("load"))?;
            Ok(StoredPolicy { rules, edges })
        })
        .await
    }

    pub async fn rule_exists(&self, rule: &PolicyRule) -> Result<bool, AuthzError> {
        self.bounded("rule_exists", async {
            Ok(rule_query(rule)
                .one(&self.db)
                .await
                .map_err(db_err("rule_exists"))?
                .is_some())
        })
        .await
    }

    /// Returns `false` when an identical rule is already stored.
    pub async fn insert_rule(&self, rule: &PolicyRule) -> Result<bool, AuthzError> {
        self.bounded("insert_rule", insert_rule_on(&self.db, rule))
            .await
    }

    /// Returns `false` when no such rule was stored.
    pub async fn delete_rule(&self, rule: &PolicyRule) -> Result<bool, AuthzError> {
        self.bounded("delete_rule", delete_rule_on(&self.db, rule))
            .await
    }

    /// Swap `old` for `new` inside one transaction.
    ///
    /// A failed create rolls the delete back. Only when that rollback itself
    /// fails does the caller see [`AuthzError::PartialUpdate`].
    pub async fn replace_rule(&self, old: &PolicyRule, new: &PolicyRule) -> Result<(), AuthzError> {
        let txn = self.begin("replace_rule").await?;

        let removed = self
            .bounded("replace_rule", delete_rule_on(&txn, old))
            .await?;
        if !removed {
            self.rollback(txn, "replace_rule").await?;
            return Err(AuthzError::RuleNotFound(old.clone()));
        }

        let created = self
            .bounded("replace_rule", insert_rule_on(&txn, new))
            .await;
        match created {
            Ok(true) => self.commit(txn, "replace_rule").await,
            Ok(false) => {
                self.rollback_after_delete(txn, old, "replacement rule already exists")
                    .await?;
                Err(AuthzError::DuplicateRule(new.clone()))
            }
            Err(e) => {
                self.rollback_after_delete(txn, old, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    pub async fn edge_exists(&self, relation: &Relation) -> Result<bool, AuthzError> {
        let (source, target) = relation.encode();
        self.bounded("edge_exists", async {
            Ok(role_edge::Entity::find()
                .filter(role_edge::Column::Source.eq(source))
                .filter(role_edge::Column::Target.eq(target))
                .one(&self.db)
                .await
                .map_err(db_err("edge_exists"))?
                .is_some())
        })
        .await
    }

    /// Returns `false` when the edge is already stored.
    pub async fn insert_edge(&self, relation: &Relation) -> Result<bool, AuthzError> {
        self.bounded("insert_edge", insert_edge_on(&self.db, relation))
            .await
    }

    /// Returns `false` when no such edge was stored.
    pub async fn delete_edge(&self, relation: &Relation) -> Result<bool, AuthzError> {
        let (source, target) = relation.encode();
        self.bounded("delete_edge", async {
            let res = role_edge::Entity::delete_many()
                .filter(role_edge::Column::Source.eq(source))
                .filter(role_edge::Column::Target.eq(target))
                .exec(&self.db)
                .await
                .map_err(db_err("delete_edge"))?;
            Ok(res.rows_affected > 0)
        })
        .await
    }

    /// Drop every assignment edge of `user`. Returns the number removed.
    pub async fn delete_user_edges(&self, user: &UserId) -> Result<u64, AuthzError> {
        self.bounded("delete_user_edges", delete_user_edges_on(&self.db, user))
            .await
    }

    /// Clear the user's assignments and add `user -> role` in one transaction.
    pub async fn replace_user_role(&self, user: &UserId, role: &RoleId) -> Result<(), AuthzError> {
        let txn = self.begin("replace_user_role").await?;
        let relation = Relation::Assignment {
            user: user.clone(),
            role: role.clone(),
        };

        let outcome = async {
            self.bounded("replace_user_role", delete_user_edges_on(&txn, user))
                .await?;
            self.bounded("replace_user_role", insert_edge_on(&txn, &relation))
                .await
        }
        .await;

        match outcome {
            Ok(_) => self.commit(txn, "replace_user_role").await,
            Err(e) => {
                self.rollback(txn, "replace_user_role").await?;
                Err(e)
            }
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AuthzError>
    where
        F: Future<Output = Result<T, AuthzError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AuthzError::StoreUnavailable {
                operation,
                reason: format!("timed out after {}ms", self.timeout.as_millis()),
            }),
        }
    }

    async fn begin(&self, operation: &'static str) -> Result<DatabaseTransaction, AuthzError> {
        self.bounded(operation, async {
            self.db.begin().await.map_err(db_err(operation))
        })
        .await
    }

    async fn commit(&self, txn: DatabaseTransaction, operation: &'static str) -> Result<(), AuthzError> {
        self.bounded(operation, async move {
            txn.commit().await.map_err(db_err(operation))
        })
        .await
    }

    async fn rollback(&self, txn: DatabaseTransaction, operation: &'static str) -> Result<(), AuthzError> {
        self.bounded(operation, async move {
            txn.rollback().await.map_err(db_err(operation))
        })
        .await
    }

    async fn rollback_after_delete(
        &self,
        txn: DatabaseTransaction,
        old: &PolicyRule,
        cause: &str,
    ) -> Result<(), AuthzError> {
        match self.rollback(txn, "replace_rule").await {
            Ok(()) => {
                tracing::warn!(%old, cause, "Policy update rolled back");
                Ok(())
            }
            Err(rollback_err) => {
                tracing::error!(
                    old_role = %old.role,
                    old_resource = %old.resource,
                    old_action = %old.action,
                    cause,
                    error = %rollback_err,
                    "Policy update partially applied: old rule deleted, replacement not stored"
                );
                Err(AuthzError::PartialUpdate {
                    old: old.clone(),
                    reason: format!("{cause}; rollback failed: {rollback_err}"),
                })
            }
        }
    }
}

fn db_err(operation: &'static str) -> impl Fn(DbErr) -> AuthzError {
    move |e| AuthzError::StoreUnavailable {
        operation,
        reason: e.to_string(),
    }
}

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn rule_query(rule: &PolicyRule) -> sea_orm::Select<policy_rule::Entity> {
    policy_rule::Entity::find()
        .filter(policy_rule::Column::Role.eq(rule.role.as_str()))
        .filter(policy_rule::Column::Resource.eq(rule.resource.as_str()))
        .filter(policy_rule::Column::Action.eq(rule.action.as_str()))
}

async fn insert_rule_on<C: ConnectionTrait>(conn: &C, rule: &PolicyRule) -> Result<bool, AuthzError> {
    let model = policy_rule::ActiveModel {
        id: Default::default(),
        role: Set(rule.role.as_str().to_string()),
        resource: Set(rule.resource.as_str().to_string()),
        action: Set(rule.action.as_str().to_string()),
    };
    match model.insert(conn).await {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(db_err("insert_rule")(e)),
    }
}

async fn delete_rule_on<C: ConnectionTrait>(conn: &C, rule: &PolicyRule) -> Result<bool, AuthzError> {
    let res = policy_rule::Entity::delete_many()
        .filter(policy_rule::Column::Role.eq(rule.role.as_str()))
        .filter(policy_rule::Column::Resource.eq(rule.resource.as_str()))
        .filter(policy_rule::Column::Action.eq(rule.action.as_str()))
        .exec(conn)
        .await
        .map_err(db_err("delete_rule"))?;
    Ok(res.rows_affected > 0)
}

async fn insert_edge_on<C: ConnectionTrait>(conn: &C, relation: &Relation) -> Result<bool, AuthzError> {
    let (source, target) = relation.encode();
    let model = role_edge::ActiveModel {
        id: Default::default(),
        source: Set(source),
        target: Set(target),
    };
    match model.insert(conn).await {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(db_err("insert_edge")(e)),
    }
}

async fn delete_user_edges_on<C: ConnectionTrait>(conn: &C, user: &UserId) -> Result<u64, AuthzError> {
    let res = role_edge::Entity::delete_many()
        .filter(role_edge::Column::Source.eq(user.as_str()))
        .exec(conn)
        .await
        .map_err(db_err("delete_user_edges"))?;
    Ok(res.rows_affected)
}
