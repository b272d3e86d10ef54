pub mod policy_rule;
pub mod role_edge;
