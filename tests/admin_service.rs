mod helpers;

use helpers::{edge, resource, role, rule, user, PolicyBuilder, TestDb};
use rolegate::authz::types::Action;
use rolegate::authz::{AuthzError, ReloadPolicy};

#[tokio::test]
async fn test_inheritance_grants_transitively() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new()
        .rule("user", "/posts", Action::Read)
        .assign("1", "admin")
        .assign("2", "moderator")
        .assign("3", "user")
        .apply(&db.store())
        .await;

    admin.create_inheritance(&edge("admin", "moderator")).await.unwrap();
    admin.create_inheritance(&edge("moderator", "user")).await.unwrap();

    let enforcer = admin.enforcer();
    assert!(enforcer.allowed(&user("1"), &resource("/posts"), Action::Read).await);
    assert!(!enforcer.allowed(&user("1"), &resource("/posts"), Action::Delete).await);
}

#[tokio::test]
async fn test_user_id_equal_to_role_name_is_isolated() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new()
        .rule("5", "/vault", Action::Read)
        .assign("9", "5")
        .assign("5", "user")
        .apply(&db.store())
        .await;

    let enforcer = admin.enforcer();
    assert!(enforcer.allowed(&user("9"), &resource("/vault"), Action::Read).await);
    assert!(!enforcer.allowed(&user("5"), &resource("/vault"), Action::Read).await);
    assert_eq!(admin.find_role_for_user(&user("5")).await.unwrap(), Some(role("user")));
}

#[tokio::test]
async fn test_inheritance_requires_existing_roles() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new().assign("1", "admin").apply(&db.store()).await;

    let err = admin.create_inheritance(&edge("ghost", "admin")).await.unwrap_err();
    assert!(matches!(err, AuthzError::UnknownRole(r) if r == role("ghost")));

    let err = admin.create_inheritance(&edge("admin", "ghost")).await.unwrap_err();
    assert!(matches!(err, AuthzError::UnknownRole(r) if r == role("ghost")));
}

#[tokio::test]
async fn test_inheritance_rejects_self_duplicate_and_cycle() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new()
        .assign("1", "a")
        .assign("2", "b")
        .assign("3", "c")
        .apply(&db.store())
        .await;

    assert!(matches!(
        admin.create_inheritance(&edge("a", "a")).await,
        Err(AuthzError::SelfInheritance(_))
    ));

    admin.create_inheritance(&edge("a", "b")).await.unwrap();
    admin.create_inheritance(&edge("b", "c")).await.unwrap();
    assert!(matches!(
        admin.create_inheritance(&edge("a", "b")).await,
        Err(AuthzError::DuplicateEdge(_))
    ));
    assert!(matches!(
        admin.create_inheritance(&edge("c", "a")).await,
        Err(AuthzError::InheritanceCycle(_))
    ));
}

#[tokio::test]
async fn test_delete_inheritance() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new()
        .assign("1", "a")
        .assign("2", "b")
        .inherit("a", "b")
        .apply(&db.store())
        .await;

    admin.delete_inheritance(&edge("a", "b")).await.unwrap();
    assert!(matches!(
        admin.delete_inheritance(&edge("a", "b")).await,
        Err(AuthzError::EdgeNotFound(_))
    ));
    assert!(admin.find_all_inheritance(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_assignment_replaces_previous_role() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new()
        .assign("10", "admin")
        .assign("11", "user")
        .apply(&db.store())
        .await;

    let u = user("42");
    admin.assign_role(&u, &role("admin")).await.unwrap();
    admin.assign_role(&u, &role("user")).await.unwrap();

    assert_eq!(admin.find_role_for_user(&u).await.unwrap(), Some(role("user")));
    let graph = admin.enforcer().reload().await.unwrap();
    assert_eq!(graph.roles_of(&u), Some(role("user")));
    assert!(!graph.effective_roles(&role("user")).contains(&role("admin")));
}

#[tokio::test]
async fn test_assign_unknown_role_fails() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);

    let err = admin.assign_role(&user("1"), &role("ghost")).await.unwrap_err();
    assert!(matches!(err, AuthzError::UnknownRole(_)));
    assert_eq!(admin.find_role_for_user(&user("1")).await.unwrap(), None);
}

#[tokio::test]
async fn test_create_role() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);

    admin.create_role(&user("1"), &role("auditor")).await.unwrap();
    assert!(admin.find_all_roles().await.unwrap().contains(&role("auditor")));

    let err = admin.create_role(&user("2"), &role("auditor")).await.unwrap_err();
    assert!(matches!(err, AuthzError::RoleAlreadyExists(_)));

    // creating a role moves the member out of their previous role
    admin.create_role(&user("1"), &role("reviewer")).await.unwrap();
    assert_eq!(
        admin.find_role_for_user(&user("1")).await.unwrap(),
        Some(role("reviewer"))
    );
    assert!(!admin.find_all_roles().await.unwrap().contains(&role("auditor")));
}

#[tokio::test]
async fn test_remove_user_roles_is_idempotent() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new().assign("1", "admin").apply(&db.store()).await;

    admin.remove_user_roles(&user("1")).await.unwrap();
    admin.remove_user_roles(&user("1")).await.unwrap();
    admin.remove_user_roles(&user("never-seen")).await.unwrap();
    assert_eq!(admin.find_role_for_user(&user("1")).await.unwrap(), None);
}

#[tokio::test]
async fn test_rule_lifecycle_controls_access() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new().assign("1", "admin").apply(&db.store()).await;

    let grant = rule("admin", "/reports", Action::Read);
    let enforcer = admin.enforcer().clone();

    admin.create_rule(&grant).await.unwrap();
    assert!(enforcer.allowed(&user("1"), &resource("/reports"), Action::Read).await);

    assert!(matches!(
        admin.create_rule(&grant).await,
        Err(AuthzError::DuplicateRule(_))
    ));

    admin.delete_rule(&grant).await.unwrap();
    assert!(!enforcer.allowed(&user("1"), &resource("/reports"), Action::Read).await);

    assert!(matches!(
        admin.delete_rule(&grant).await,
        Err(AuthzError::RuleNotFound(_))
    ));
}

#[tokio::test]
async fn test_update_rule() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    let read = rule("admin", "/reports", Action::Read);
    let update = rule("admin", "/reports", Action::Update);
    let delete = rule("admin", "/reports", Action::Delete);

    admin.create_rule(&read).await.unwrap();
    admin.create_rule(&delete).await.unwrap();

    admin.update_rule(&read, &update).await.unwrap();
    let rules = admin.find_rules_for_resource(&resource("/reports")).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].action, vec![Action::Update, Action::Delete]);

    // new already present: nothing changes
    assert!(matches!(
        admin.update_rule(&update, &delete).await,
        Err(AuthzError::DuplicateRule(_))
    ));
    // old absent
    assert!(matches!(
        admin.update_rule(&read, &update).await,
        Err(AuthzError::RuleNotFound(_))
    ));
    // no-op still requires old to exist
    admin.update_rule(&update, &update).await.unwrap();
    assert!(matches!(
        admin.update_rule(&read, &read).await,
        Err(AuthzError::RuleNotFound(_))
    ));

    let rules = admin.find_rules_for_resource(&resource("/reports")).await.unwrap();
    assert_eq!(rules[0].action, vec![Action::Update, Action::Delete]);
}

#[tokio::test]
async fn test_find_all_rules_groups_filters_and_sorts() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new()
        .rule("user", "/api/users", Action::Read)
        .rule("admin", "/api/users", Action::Delete)
        .rule("admin", "/api/users", Action::Create)
        .rule("user", "/api/posts", Action::Read)
        .apply(&db.store())
        .await;

    let all = admin.find_all_rules(None).await.unwrap();
    let summary: Vec<_> = all
        .iter()
        .map(|c| (c.resource.as_str(), c.role.as_str(), c.action.len()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("/api/posts", "user", 1),
            ("/api/users", "admin", 2),
            ("/api/users", "user", 1),
        ]
    );

    let filtered = admin.find_all_rules(Some("USERS")).await.unwrap();
    assert_eq!(filtered.len(), 2);
    assert!(filtered.iter().all(|c| c.resource.as_str() == "/api/users"));

    // exact resource match only
    assert!(admin
        .find_rules_for_resource(&resource("/api"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_find_all_inheritance_search() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new()
        .assign("1", "admin")
        .assign("2", "moderator")
        .assign("3", "user")
        .inherit("admin", "moderator")
        .inherit("moderator", "user")
        .apply(&db.store())
        .await;

    assert_eq!(admin.find_all_inheritance(None).await.unwrap().len(), 2);
    let hits = admin.find_all_inheritance(Some("ADMIN")).await.unwrap();
    assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![edge("admin", "moderator")]);
    assert_eq!(admin.find_all_inheritance(Some("moder")).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cached_enforcer_invalidated_by_mutations() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::Cached);
    PolicyBuilder::new().assign("1", "admin").apply(&db.store()).await;
    let enforcer = admin.enforcer().clone();

    // prime the cache
    assert!(!enforcer.allowed(&user("1"), &resource("/reports"), Action::Read).await);

    admin
        .create_rule(&rule("admin", "/reports", Action::Read))
        .await
        .unwrap();
    assert!(enforcer.allowed(&user("1"), &resource("/reports"), Action::Read).await);

    admin.remove_user_roles(&user("1")).await.unwrap();
    assert!(!enforcer.allowed(&user("1"), &resource("/reports"), Action::Read).await);
}

#[tokio::test]
async fn test_store_failure_fails_closed() {
    let db = TestDb::new().await;
    let admin = db.admin(ReloadPolicy::EveryRequest);
    PolicyBuilder::new()
        .rule("admin", "/reports", Action::Read)
        .assign("1", "admin")
        .apply(&db.store())
        .await;
    let enforcer = admin.enforcer().clone();
    assert!(enforcer.allowed(&user("1"), &resource("/reports"), Action::Read).await);

    db.break_schema().await;

    assert!(!enforcer.allowed(&user("1"), &resource("/reports"), Action::Read).await);
    assert!(matches!(
        enforcer.enforce(&user("1"), &resource("/reports"), Action::Read).await,
        Err(AuthzError::SnapshotLoadFailed(_))
    ));
    assert!(matches!(
        admin.create_rule(&rule("admin", "/x", Action::Read)).await,
        Err(AuthzError::StoreUnavailable { .. })
    ));
}
