//! Role-based authorization: policy storage, the role graph, enforcement,
//! administration and request middleware.

pub mod admin;
pub mod bootstrap;
pub mod enforcer;
pub mod errors;
pub mod graph;
pub mod identity;
pub mod middleware;
pub mod namespace;
pub mod store;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;
pub mod web;

pub use admin::PolicyAdmin;
pub use enforcer::{Enforcer, ReloadPolicy};
pub use errors::AuthzError;
pub use store::PolicyStore;
