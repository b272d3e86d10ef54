use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::authz::errors::AuthzError;
use crate::authz::graph::RoleGraph;
use crate::authz::store::PolicyStore;
use crate::authz::types::{Action, Resource, UserId};

/// When the enforcer rebuilds its snapshot from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Reload before every decision. Writes are visible to the next request.
    #[default]
    EveryRequest,
    /// Keep the snapshot until [`Enforcer::invalidate`] is called.
    Cached,
}

/// Answers permission queries against a snapshot of the policy store.
///
/// Constructed once and shared as `Arc<Enforcer>` by the admin service, the
/// middleware and the admin API.
pub struct Enforcer {
    store: PolicyStore,
    reload: ReloadPolicy,
    cached: RwLock<Option<Arc<RoleGraph>>>,
    /// Bumped under the cache write lock by every invalidation.
    generation: AtomicU64,
}

impl Enforcer {
    pub fn new(store: PolicyStore, reload: ReloadPolicy) -> Self {
        Self {
            store,
            reload,
            cached: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        self.reload
    }

    /// Build a fresh graph from the store, bypassing any cache. The cache is
    /// refreshed as a side effect in cached mode, unless an invalidation
    /// happened while the store was being read.
    pub async fn reload(&self) -> Result<Arc<RoleGraph>, AuthzError> {
        let generation = self.generation.load(Ordering::Acquire);
        let graph = self.load_graph().await?;
        self.install(generation, graph.clone()).await;

        tracing::debug!(
            rules = graph.rules().len(),
            roles = graph.all_roles().len(),
            "Reloaded policy snapshot"
        );
        Ok(graph)
    }

    async fn load_graph(&self) -> Result<Arc<RoleGraph>, AuthzError> {
        let stored = self.store.load().await.map_err(|e| match e {
            AuthzError::SnapshotLoadFailed(_) => e,
            other => AuthzError::SnapshotLoadFailed(other.to_string()),
        })?;
        Ok(Arc::new(RoleGraph::build(&stored)?))
    }

    /// Cache `graph` if no invalidation happened since `generation` was read.
    async fn install(&self, generation: u64, graph: Arc<RoleGraph>) -> bool {
        if self.reload != ReloadPolicy::Cached {
            return false;
        }
        let mut cached = self.cached.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!("Discarding policy snapshot read before an invalidation");
            return false;
        }
        *cached = Some(graph);
        true
    }

    /// Current snapshot according to the reload policy.
    pub async fn snapshot(&self) -> Result<Arc<RoleGraph>, AuthzError> {
        if self.reload == ReloadPolicy::Cached {
            if let Some(graph) = self.cached.read().await.as_ref() {
                return Ok(graph.clone());
            }
        }
        self.reload().await
    }

    /// Drop the cached snapshot so the next decision sees the store.
    pub async fn invalidate(&self) {
        if self.reload == ReloadPolicy::Cached {
            let mut cached = self.cached.write().await;
            self.generation.fetch_add(1, Ordering::AcqRel);
            *cached = None;
        }
    }

    pub async fn enforce(
        &self,
        user: &UserId,
        resource: &Resource,
        action: Action,
    ) -> Result<bool, AuthzError> {
        let graph = self.snapshot().await?;
        let allowed = graph.allowed(user, resource, action);

        tracing::debug!(
            user = %user,
            role = graph.roles_of(user).as_ref().map(|r| r.as_str()).unwrap_or("-"),
            resource = %resource,
            action = %action,
            allowed,
            "Authorization decision"
        );
        Ok(allowed)
    }

    /// Fail-closed variant of [`Enforcer::enforce`]: any error denies.
    pub async fn allowed(&self, user: &UserId, resource: &Resource, action: Action) -> bool {
        match self.enforce(user, resource, action).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(
                    user = %user,
                    resource = %resource,
                    action = %action,
                    error = %e,
                    "Denying request: policy snapshot unavailable"
                );
                false
            }
        }
    }
}
