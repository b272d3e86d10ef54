//! Idempotent seeding of rules, assignments and inheritance from a policy file.
//!
//! File format, one record per line, fields comma-separated and trimmed:
//!
//! ```text
//! # comment
//! p, admin, /api/users, read        permission rule
//! g, 1, role:admin                  user assignment
//! g, role:admin, role:moderator     inheritance (tagged source)
//! g2, moderator, user               inheritance
//! ```

use std::path::Path;

use crate::authz::errors::AuthzError;
use crate::authz::graph::RoleGraph;
use crate::authz::namespace::{is_tagged, untag, Relation};
use crate::authz::store::PolicyStore;
use crate::authz::types::{Action, InheritanceEdge, PolicyRule, Resource, RoleId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRecord {
    Rule(PolicyRule),
    Assignment { user: UserId, role: RoleId },
    Inheritance(InheritanceEdge),
}

/// Per-record outcome counts of one seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub inserted: usize,
    pub existing: usize,
    pub skipped: usize,
}

#[derive(Debug)]
enum SeedResult {
    Inserted,
    Existing,
    Skipped,
}

impl BootstrapReport {
    fn record(&mut self, result: SeedResult) {
        match result {
            SeedResult::Inserted => self.inserted += 1,
            SeedResult::Existing => self.existing += 1,
            SeedResult::Skipped => self.skipped += 1,
        }
    }
}

pub fn parse_policy_file(contents: &str) -> Result<Vec<PolicyRecord>, AuthzError> {
    let mut records = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let invalid = |reason: String| AuthzError::InvalidPolicyFile { line, reason };
        let expect = |n: usize| {
            if fields.len() == n {
                Ok(())
            } else {
                Err(invalid(format!(
                    "`{}` record takes {} fields, found {}",
                    fields[0],
                    n,
                    fields.len()
                )))
            }
        };
        let role = |raw: &str| RoleId::parse(untag(raw)).map_err(invalid);

        let record = match fields[0] {
            "p" => {
                expect(4)?;
                PolicyRecord::Rule(PolicyRule {
                    role: role(fields[1])?,
                    resource: Resource::parse(fields[2]).map_err(invalid)?,
                    action: fields[3].parse::<Action>().map_err(invalid)?,
                })
            }
            "g" => {
                expect(3)?;
                if is_tagged(fields[1]) {
                    PolicyRecord::Inheritance(InheritanceEdge {
                        role: role(fields[1])?,
                        inherits_from: role(fields[2])?,
                    })
                } else {
                    PolicyRecord::Assignment {
                        user: UserId::parse(fields[1]).map_err(invalid)?,
                        role: role(fields[2])?,
                    }
                }
            }
            "g2" => {
                expect(3)?;
                PolicyRecord::Inheritance(InheritanceEdge {
                    role: role(fields[1])?,
                    inherits_from: role(fields[2])?,
                })
            }
            other => {
                return Err(invalid(format!(
                    "unknown record type `{other}` (expected p, g or g2)"
                )))
            }
        };
        records.push(record);
    }

    Ok(records)
}

pub fn load_policy_file(path: &Path) -> Result<Vec<PolicyRecord>, AuthzError> {
    let contents = std::fs::read_to_string(path).map_err(|source| AuthzError::PolicyFileLoad {
        path: path.display().to_string(),
        source,
    })?;
    parse_policy_file(&contents)
}

pub async fn seed_from_file(store: &PolicyStore, path: &Path) -> Result<BootstrapReport, AuthzError> {
    tracing::info!("Loading default policy from {}", path.display());
    let records = load_policy_file(path)?;
    tracing::info!("Found {} policy record(s) in file", records.len());
    seed(store, &records).await
}

/// Insert every record that is not already present.
///
/// Records are applied in three passes (rules, assignments, inheritance)
/// whatever their order in the file, so inheritance edges only reference
/// roles that assignments have already established.
pub async fn seed(store: &PolicyStore, records: &[PolicyRecord]) -> Result<BootstrapReport, AuthzError> {
    let mut report = BootstrapReport::default();

    for rule in records.iter().filter_map(|r| match r {
        PolicyRecord::Rule(rule) => Some(rule),
        _ => None,
    }) {
        report.record(seed_rule(store, rule).await?);
    }

    let mut graph = load_graph(store).await?;
    for (user, role) in records.iter().filter_map(|r| match r {
        PolicyRecord::Assignment { user, role } => Some((user, role)),
        _ => None,
    }) {
        let result = seed_assignment(store, &graph, user, role).await?;
        if matches!(result, SeedResult::Inserted) {
            graph = load_graph(store).await?;
        }
        report.record(result);
    }

    for edge in records.iter().filter_map(|r| match r {
        PolicyRecord::Inheritance(edge) => Some(edge),
        _ => None,
    }) {
        let result = seed_inheritance(store, &graph, edge).await?;
        if matches!(result, SeedResult::Inserted) {
            graph = load_graph(store).await?;
        }
        report.record(result);
    }

    tracing::info!(
        "Policy bootstrap complete: {} inserted, {} existing, {} skipped",
        report.inserted,
        report.existing,
        report.skipped
    );

    Ok(report)
}

async fn load_graph(store: &PolicyStore) -> Result<RoleGraph, AuthzError> {
    RoleGraph::build(&store.load().await?)
}

async fn seed_rule(store: &PolicyStore, rule: &PolicyRule) -> Result<SeedResult, AuthzError> {
    if store.rule_exists(rule).await? {
        return Ok(SeedResult::Existing);
    }
    if store.insert_rule(rule).await? {
        tracing::debug!(%rule, "Seeded policy rule");
        Ok(SeedResult::Inserted)
    } else {
        Ok(SeedResult::Existing)
    }
}

async fn seed_assignment(
    store: &PolicyStore,
    graph: &RoleGraph,
    user: &UserId,
    role: &RoleId,
) -> Result<SeedResult, AuthzError> {
    // a user that already holds a role keeps it; assignments are single-valued
    if let Some(current) = graph.roles_of(user) {
        if &current != role {
            tracing::debug!(
                user = %user,
                current = %current,
                seeded = %role,
                "User already has a role; leaving assignment unchanged"
            );
        }
        return Ok(SeedResult::Existing);
    }

    let relation = Relation::Assignment {
        user: user.clone(),
        role: role.clone(),
    };
    if store.insert_edge(&relation).await? {
        tracing::debug!(user = %user, role = %role, "Seeded role assignment");
        Ok(SeedResult::Inserted)
    } else {
        Ok(SeedResult::Existing)
    }
}

async fn seed_inheritance(
    store: &PolicyStore,
    graph: &RoleGraph,
    edge: &InheritanceEdge,
) -> Result<SeedResult, AuthzError> {
    if graph.has_inheritance(edge) {
        return Ok(SeedResult::Existing);
    }

    for role in [&edge.role, &edge.inherits_from] {
        if !graph.role_exists(role) {
            tracing::warn!(%edge, role = %role, "Skipping inheritance record: role has no assignment or inheritance edge");
            return Ok(SeedResult::Skipped);
        }
    }
    if edge.role == edge.inherits_from || graph.would_create_cycle(&edge.role, &edge.inherits_from) {
        tracing::warn!(%edge, "Skipping inheritance record: would create a cycle");
        return Ok(SeedResult::Skipped);
    }

    if store.insert_edge(&Relation::Inheritance(edge.clone())).await? {
        tracing::debug!(%edge, "Seeded role inheritance");
        Ok(SeedResult::Inserted)
    } else {
        Ok(SeedResult::Existing)
    }
}
