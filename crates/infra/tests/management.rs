mod common;

use gatehouse_infra::ServiceError;
use gatehouse_infra::audit::{AuditAction, AuditContext, AuditRepository};
use gatehouse_infra::services::{LoginInput, NewRole, NewUser, RolePatch, UserPatch};
use gatehouse_infra::store::{Pagination, RoleFilter, UserFilter};

use common::{deadline, seed_user, settle, world};

fn system() -> AuditContext {
    AuditContext::system()
}

fn new_user(username: &str) -> NewUser {
    NewUser {
        name: format!("{username} example"),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        status: None,
        role_ids: Vec::new(),
    }
}

fn new_role(name: &str, permissions: &[&str]) -> NewRole {
    NewRole {
        name: name.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        enabled: None,
    }
}

#[tokio::test]
async fn referenced_role_delete_conflicts_and_keeps_both_records() {
    let w = world();
    let role = w.role_service.create(&system(), new_role("editors", &["users:edit"])).await.unwrap();
    let mut input = new_user("member");
    input.role_ids = vec![role.id];
    let user = w.user_service.create(&system(), input).await.unwrap();

    let err = w.role_service.delete(&system(), &[role.id]).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    assert!(w.role_service.get(role.id).await.is_ok());
    assert_eq!(w.user_service.get(user.id).await.unwrap().roles.len(), 1);
}

#[tokio::test]
async fn duplicate_fields_conflict() {
    let w = world();
    w.user_service.create(&system(), new_user("unique")).await.unwrap();

    let mut same_email = new_user("another");
    same_email.email = "unique@example.com".into();
    assert!(matches!(
        w.user_service.create(&system(), same_email).await,
        Err(ServiceError::Conflict(_))
    ));

    w.role_service.create(&system(), new_role("viewers", &[])).await.unwrap();
    assert!(matches!(
        w.role_service.create(&system(), new_role("viewers", &["*"])).await,
        Err(ServiceError::Conflict(_))
    ));
}

#[tokio::test]
async fn unknown_role_id_is_a_validation_error() {
    let w = world();
    let mut input = new_user("orphan");
    input.role_ids = vec![gatehouse_core::RoleId::new()];
    assert_eq!(
        w.user_service.create(&system(), input).await,
        Err(ServiceError::Validation("role not found".into()))
    );
}

#[tokio::test]
async fn short_fields_are_rejected() {
    let w = world();
    let mut input = new_user("valid");
    input.name = "Abe".into();
    assert!(matches!(w.user_service.create(&system(), input).await, Err(ServiceError::Validation(_))));
    assert!(matches!(
        w.role_service.create(&system(), new_role("abc", &[])).await,
        Err(ServiceError::Validation(_))
    ));
}

#[tokio::test]
async fn new_user_sets_a_password_once_then_logs_in() {
    let w = world();
    let view = w.user_service.create(&system(), new_user("newbie")).await.unwrap();
    assert!(view.new);

    let login = LoginInput {
        login: "newbie".into(),
        password: "first-pass".into(),
        expiration: true,
    };
    assert_eq!(
        w.session.login(&login, deadline()).await,
        Err(ServiceError::InvalidCredentials)
    );

    assert!(matches!(
        w.user_service
            .set_password("newbie@example.com", "first-pass", "other-pass")
            .await,
        Err(ServiceError::Validation(_))
    ));
    w.user_service
        .set_password("newbie@example.com", "first-pass", "first-pass")
        .await
        .unwrap();
    assert!(w.session.login(&login, deadline()).await.is_ok());

    assert!(matches!(
        w.user_service
            .set_password("newbie@example.com", "again-pass", "again-pass")
            .await,
        Err(ServiceError::Conflict(_))
    ));
}

#[tokio::test]
async fn reset_password_blocks_login_and_accepts_unknown_email() {
    let w = world();
    seed_user(&w, "resetme", "s3cret!", &[]).await;
    w.user_service.reset_password("resetme@example.com").await.unwrap();
    w.user_service.reset_password("ghost@example.com").await.unwrap();

    let login = LoginInput {
        login: "resetme".into(),
        password: "s3cret!".into(),
        expiration: true,
    };
    assert_eq!(
        w.session.login(&login, deadline()).await,
        Err(ServiceError::InvalidCredentials)
    );
}

#[tokio::test]
async fn disabling_a_role_removes_its_permissions_from_fresh_reads() {
    let w = world();
    let role = w
        .role_service
        .create(&system(), new_role("auditors", &["users:view"]))
        .await
        .unwrap();
    let mut input = new_user("audrey");
    input.role_ids = vec![role.id];
    let user = w.user_service.create(&system(), input).await.unwrap();
    assert_eq!(user.permissions, vec!["users:view"]);

    w.role_service
        .update(&system(), role.id, RolePatch { enabled: Some(false), ..Default::default() })
        .await
        .unwrap();
    assert!(w.user_service.get(user.id).await.unwrap().permissions.is_empty());
}

#[tokio::test]
async fn update_replaces_roles_and_rechecks_uniqueness() {
    let w = world();
    let a = w.role_service.create(&system(), new_role("alpha", &["users:view"])).await.unwrap();
    let b = w.role_service.create(&system(), new_role("bravo", &["roles:view"])).await.unwrap();
    w.user_service.create(&system(), new_user("taken")).await.unwrap();
    let mut input = new_user("mover");
    input.role_ids = vec![a.id];
    let user = w.user_service.create(&system(), input).await.unwrap();

    let updated = w
        .user_service
        .update(&system(), user.id, UserPatch { role_ids: Some(vec![b.id]), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(updated.permissions, vec!["roles:view"]);

    let clash = UserPatch {
        username: Some("taken".into()),
        ..Default::default()
    };
    assert!(matches!(
        w.user_service.update(&system(), user.id, clash).await,
        Err(ServiceError::Conflict(_))
    ));
}

#[tokio::test]
async fn listing_filters_and_paginates() {
    let w = world();
    for name in ["zulu1", "alpha", "mike1", "bravo"] {
        w.user_service.create(&system(), new_user(name)).await.unwrap();
    }

    let page = w
        .user_service
        .list(&UserFilter {
            pagination: Pagination::new(Some(1), Some(2)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total_items, 4);
    assert_eq!(page.total_pages, 2);
    let names: Vec<_> = page.items.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["alpha", "bravo"]);

    let found = w
        .user_service
        .list(&UserFilter { search: Some("MIKE".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(found.total_items, 1);

    w.role_service.create(&system(), new_role("ops-team", &[])).await.unwrap();
    let roles = w.role_service.list(&RoleFilter::default()).await.unwrap();
    assert_eq!(roles.total_items, 1);
    assert_eq!(w.role_service.list_items().await.unwrap()[0].name, "ops-team");
}

#[tokio::test]
async fn deleting_users_is_idempotent_for_unknown_ids() {
    let w = world();
    let user = w.user_service.create(&system(), new_user("short-lived")).await.unwrap();
    assert_eq!(w.user_service.delete(&system(), &[]).await.unwrap(), 0);
    assert_eq!(w.user_service.delete(&system(), &[user.id]).await.unwrap(), 1);
    assert_eq!(w.user_service.delete(&system(), &[user.id]).await.unwrap(), 0);
    assert_eq!(w.user_service.get(user.id).await, Err(ServiceError::NotFound("user")));
}

#[tokio::test]
async fn management_writes_leave_an_audit_trail() {
    let w = world();
    let admin = seed_user(&w, "auditing-admin", "s3cret!", &["*"]).await;
    let ctx = AuditContext::actor(admin.id)
        .with_ip("203.0.113.9")
        .with_user_agent("gatehouse-tests");

    let role = w.role_service.create(&ctx, new_role("moderators", &["users:view"])).await.unwrap();
    let user = w.user_service.create(&ctx, new_user("moderated")).await.unwrap();
    w.user_service
        .update(&ctx, user.id, UserPatch { name: Some("Moderated Person".into()), ..Default::default() })
        .await
        .unwrap();
    w.user_service.delete(&ctx, &[user.id]).await.unwrap();
    w.role_service.delete(&ctx, &[role.id]).await.unwrap();
    settle().await;

    let trail = w.audit.recent(10).await.unwrap();
    let mut steps: Vec<_> = trail
        .iter()
        .map(|e| (e.action, e.resource_type.clone(), e.resource_id.clone()))
        .collect();
    steps.sort();
    let mut expected = vec![
        (AuditAction::Create, "role".to_string(), role.id.to_string()),
        (AuditAction::Create, "user".to_string(), user.id.to_string()),
        (AuditAction::Update, "user".to_string(), user.id.to_string()),
        (AuditAction::Delete, "user".to_string(), user.id.to_string()),
        (AuditAction::Delete, "role".to_string(), role.id.to_string()),
    ];
    expected.sort();
    assert_eq!(steps, expected);

    assert!(trail.iter().all(|e| e.actor_id == Some(admin.id)));
    assert!(trail.iter().all(|e| e.ip.as_deref() == Some("203.0.113.9")));
    let created = trail
        .iter()
        .find(|e| e.action == AuditAction::Create && e.resource_type == "user")
        .unwrap();
    assert_eq!(created.metadata["input"]["username"], "moderated");
    let updated = trail.iter().find(|e| e.action == AuditAction::Update).unwrap();
    assert_eq!(updated.metadata["input"]["name"], "Moderated Person");
}

#[tokio::test]
async fn rejected_writes_are_not_audited() {
    let w = world();
    w.role_service.create(&system(), new_role("solo", &[])).await.unwrap();
    assert!(w.role_service.create(&system(), new_role("solo", &[])).await.is_err());
    settle().await;

    assert_eq!(w.audit.len(), 1);
}
