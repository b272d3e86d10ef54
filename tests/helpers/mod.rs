#![allow(dead_code)]

pub mod builders;
pub mod db;

pub use builders::{edge, resource, role, rule, user, PolicyBuilder};
pub use db::TestDb;
