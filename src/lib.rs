//! Rolegate - role-based access control engine
//!
//! Policy storage, role graph enforcement, runtime policy administration and
//! the axum middleware that guards requests. All modules are exposed for
//! integration testing.

pub mod authz;
pub mod entities;
pub mod errors;
pub mod settings;
pub mod web;
