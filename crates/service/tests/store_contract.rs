//! Behaviour every backend must share. Each property is written once and
//! instantiated for the in-process, snapshot-file and SQLite backends.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use configs::{AppConfig, StorageBackend};
use service::auth::{Role, User};
use service::dashboard::{Cell, Dashboard};
use service::exploration::Exploration;
use service::{build_stores, DashboardId, ErrorKind, ExplorationId, RequestContext, RoleId, Stores, UserId};

const CATALOG: &[&str] = &["read", "write", "admin"];

fn base_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.auth.permissions = CATALOG.iter().map(|s| s.to_string()).collect();
    cfg
}

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("vizstore_contract_{}", uuid::Uuid::new_v4()))
}

async fn memory_stores() -> Result<Stores> {
    let mut cfg = base_config();
    cfg.normalize_and_validate()?;
    Ok(build_stores(&cfg).await?)
}

async fn snapshot_stores() -> Result<Stores> {
    let mut cfg = base_config();
    cfg.storage.snapshot_dir = Some(temp_dir());
    cfg.normalize_and_validate()?;
    Ok(build_stores(&cfg).await?)
}

async fn sqlite_stores() -> Result<Stores> {
    let mut cfg = base_config();
    cfg.storage.backend = StorageBackend::Database;
    cfg.database = configs::DatabaseConfig::sqlite_memory();
    cfg.normalize_and_validate()?;
    Ok(build_stores(&cfg).await?)
}

fn names(p: &service::auth::Permissions) -> Vec<&str> {
    p.iter().map(|p| p.as_str()).collect()
}

async fn catalog_lists_seed_in_order(s: Stores) -> Result<()> {
    let all = s.auth.permissions.all(&RequestContext::background()).await?;
    assert_eq!(names(&all), CATALOG);
    Ok(())
}

async fn user_round_trip(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let added = s.auth.users.add(&ctx, User::new("alice").with_permissions(["write", "read", "write"])).await?;
    assert!(added.id.is_assigned());
    let got = s.auth.users.get(&ctx, added.id).await?;
    assert_eq!(got.name, "alice");
    assert_eq!(names(&got.permissions), vec!["write", "read", "write"]);
    assert!(got.roles.is_empty());
    assert_eq!(got, added);
    Ok(())
}

async fn admin_role_grants_read_and_write(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let admin = s.auth.roles.add(&ctx, Role::new("admin").with_permissions(["read", "write"])).await?;
    let alice = s.auth.users.add(&ctx, User::new("alice").with_roles([admin])).await?;
    let effective = s.auth.effective_permissions(&ctx, alice.id).await?;
    assert_eq!(names(&effective), vec!["read", "write"]);
    assert_eq!(names(&alice.effective_permissions()), vec!["read", "write"]);
    Ok(())
}

async fn membership_views_are_shallow_and_sorted(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let ops = s.auth.roles.add(&ctx, Role::new("ops")).await?;
    let dev = s.auth.roles.add(&ctx, Role::new("dev")).await?;
    let alice = s.auth.users.add(&ctx, User::new("alice").with_roles([dev.clone(), ops.clone(), dev.clone()])).await?;
    let bob = s.auth.users.add(&ctx, User::new("bob").with_roles([ops.clone()])).await?;

    let role_ids: Vec<RoleId> = alice.roles.iter().map(|r| r.id).collect();
    assert_eq!(role_ids, vec![ops.id, dev.id]);
    assert!(alice.roles.iter().all(|r| r.users.is_empty()));

    let ops = s.auth.roles.get(&ctx, ops.id).await?;
    let members: Vec<&str> = ops.users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(members, vec!["alice", "bob"]);
    assert!(ops.users.iter().all(|u| u.roles.is_empty()));

    // Rewriting the role's member list is visible from the user side.
    let ops = s.auth.roles.update(&ctx, &ops.clone().with_users([bob.clone()])).await?;
    assert_eq!(ops.users.len(), 1);
    let alice = s.auth.users.get(&ctx, alice.id).await?;
    assert_eq!(alice.roles.iter().map(|r| r.id).collect::<Vec<_>>(), vec![dev.id]);
    Ok(())
}

async fn deleting_detaches_memberships(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let ops = s.auth.roles.add(&ctx, Role::new("ops").with_permissions(["admin"])).await?;
    let alice = s.auth.users.add(&ctx, User::new("alice").with_roles([ops.clone()])).await?;
    let bob = s.auth.users.add(&ctx, User::new("bob").with_roles([ops.clone()])).await?;

    s.auth.users.delete(&ctx, &bob).await?;
    let ops_now = s.auth.roles.get(&ctx, ops.id).await?;
    assert_eq!(ops_now.users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![alice.id]);

    s.auth.roles.delete(&ctx, &ops).await?;
    let alice = s.auth.users.get(&ctx, alice.id).await?;
    assert!(alice.roles.is_empty());
    assert!(s.auth.effective_permissions(&ctx, alice.id).await?.is_empty());
    Ok(())
}

async fn names_are_unique(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    s.auth.users.add(&ctx, User::new("alice")).await?;
    let err = s.auth.users.add(&ctx, User::new("alice")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);

    let bob = s.auth.users.add(&ctx, User::new("bob")).await?;
    let err = s.auth.users.update(&ctx, &User { name: "alice".into(), ..bob.clone() }).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert_eq!(s.auth.users.get(&ctx, bob.id).await?.name, "bob");

    s.auth.roles.add(&ctx, Role::new("ops")).await?;
    let err = s.auth.roles.add(&ctx, Role::new("ops")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    // A user and a role may share a name.
    s.auth.roles.add(&ctx, Role::new("alice")).await?;
    Ok(())
}

async fn invalid_input_is_rejected(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let err = s.auth.users.add(&ctx, User::new("")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let ghost = Role { id: RoleId(4242), ..Role::new("ghost") };
    let err = s.auth.users.add(&ctx, User::new("carol").with_roles([ghost])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let ghost = User { id: UserId(4242), ..User::new("ghost") };
    let err = s.auth.roles.add(&ctx, Role::new("ops").with_users([ghost])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = s.explorations.add(&ctx, Exploration::new(UserId(0), "x", "")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    // Nothing above may have claimed a name.
    s.auth.users.add(&ctx, User::new("carol")).await?;
    s.auth.roles.add(&ctx, Role::new("ops")).await?;
    Ok(())
}

async fn exploration_timestamps(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let added = s.explorations.add(&ctx, Exploration::new(UserId(1), "cpu", "{\"v\":1}")).await?;
    let got = s.explorations.get(&ctx, added.id).await?;
    assert_eq!(got.created_at, got.updated_at);
    assert_eq!(got, added);

    let first = s.explorations.update(&ctx, &Exploration { data: "{\"v\":2}".into(), ..got.clone() }).await?;
    let second = s.explorations.update(&ctx, &first).await?;
    let stored = s.explorations.get(&ctx, added.id).await?;
    assert!(first.updated_at > got.created_at);
    assert!(second.updated_at > first.updated_at);
    assert_eq!(stored.created_at, got.created_at);
    assert_eq!(stored.updated_at, second.updated_at);
    assert_eq!(stored.data, "{\"v\":2}");
    Ok(())
}

async fn query_is_isolated_per_user(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let mut mine = Vec::new();
    for i in 0..4 {
        mine.push(s.explorations.add(&ctx, Exploration::new(UserId(1), format!("m{i}"), "")).await?.id);
        s.explorations.add(&ctx, Exploration::new(UserId(2), format!("t{i}"), "")).await?;
    }
    let got: Vec<ExplorationId> = s.explorations.query(&ctx, UserId(1)).await?.into_iter().map(|e| e.id).collect();
    assert_eq!(got, mine);
    let theirs = s.explorations.query(&ctx, UserId(2)).await?;
    assert_eq!(theirs.len(), 4);
    assert!(theirs.iter().all(|e| e.user_id == UserId(2)));
    assert!(s.explorations.query(&ctx, UserId(99)).await?.is_empty());
    Ok(())
}

async fn delete_then_get_is_not_found(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();

    let u = s.auth.users.add(&ctx, User::new("alice")).await?;
    s.auth.users.delete(&ctx, &u).await?;
    assert_eq!(s.auth.users.get(&ctx, u.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(s.auth.users.delete(&ctx, &u).await.unwrap_err().kind(), ErrorKind::NotFound);

    let r = s.auth.roles.add(&ctx, Role::new("ops")).await?;
    s.auth.roles.delete(&ctx, &r).await?;
    assert_eq!(s.auth.roles.get(&ctx, r.id).await.unwrap_err().kind(), ErrorKind::NotFound);

    let e = s.explorations.add(&ctx, Exploration::new(UserId(1), "x", "")).await?;
    s.explorations.delete(&ctx, &e).await?;
    assert_eq!(s.explorations.get(&ctx, e.id).await.unwrap_err().kind(), ErrorKind::NotFound);

    let d = s.dashboards.add(&ctx, Dashboard::default()).await?;
    s.dashboards.delete(&ctx, &d).await?;
    assert_eq!(s.dashboards.get(&ctx, d.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(s.dashboards.list(&ctx).await?.is_empty());
    Ok(())
}

async fn update_of_missing_record_changes_nothing(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let alice = s.auth.users.add(&ctx, User::new("alice")).await?;
    let ops = s.auth.roles.add(&ctx, Role::new("ops")).await?;
    let e = s.explorations.add(&ctx, Exploration::new(UserId(1), "x", "1")).await?;
    let d = s.dashboards.add(&ctx, Dashboard::new([Cell::new(0, 0, 1, 1)])).await?;

    let err = s.auth.users.update(&ctx, &User { id: UserId(999), ..User::new("zed").with_roles([ops.clone()]) }).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = s.auth.roles.update(&ctx, &Role { id: RoleId(999), ..Role::new("zed").with_users([alice.clone()]) }).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = s.explorations.update(&ctx, &Exploration { id: ExplorationId(999), ..e.clone() }).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = s.dashboards.update(&ctx, &Dashboard { id: DashboardId(999), cells: Vec::new() }).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(s.auth.users.get(&ctx, alice.id).await?, alice);
    assert_eq!(s.auth.roles.get(&ctx, ops.id).await?, ops);
    assert_eq!(s.explorations.get(&ctx, e.id).await?, e);
    assert_eq!(s.dashboards.get(&ctx, d.id).await?, d);
    // "zed" was never stored, so the name is still free.
    s.auth.users.add(&ctx, User::new("zed")).await?;
    Ok(())
}

async fn dashboard_cells_are_replaced(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let d = s.dashboards.add(&ctx, Dashboard::new([Cell::new(0, 0, 4, 2).with_queries(["q1"])])).await?;
    let replacement = vec![
        Cell::new(0, 0, 2, 2).with_queries(["q2", "q3"]),
        Cell::new(2, 0, -2, 2),
    ];
    s.dashboards.update(&ctx, &Dashboard { id: d.id, cells: replacement.clone() }).await?;
    let got = s.dashboards.get(&ctx, d.id).await?;
    assert_eq!(got.cells, replacement);
    assert!(got.cells.iter().all(|c| c.queries.iter().all(|q| q.as_str() != "q1")));
    Ok(())
}

async fn ids_are_never_reused(s: Stores) -> Result<()> {
    let ctx = RequestContext::background();
    let a = s.auth.users.add(&ctx, User::new("a")).await?;
    s.auth.users.delete(&ctx, &a).await?;
    let b = s.auth.users.add(&ctx, User::new("a")).await?;
    assert!(b.id > a.id);

    let e1 = s.explorations.add(&ctx, Exploration::new(UserId(1), "x", "")).await?;
    s.explorations.delete(&ctx, &e1).await?;
    let e2 = s.explorations.add(&ctx, Exploration::new(UserId(1), "x", "")).await?;
    assert!(e2.id > e1.id);

    let d1 = s.dashboards.add(&ctx, Dashboard::default()).await?;
    s.dashboards.delete(&ctx, &d1).await?;
    let d2 = s.dashboards.add(&ctx, Dashboard::default()).await?;
    assert!(d2.id > d1.id);
    Ok(())
}

async fn cancelled_context_stores_nothing(s: Stores) -> Result<()> {
    let (ctx, handle) = RequestContext::background().with_cancel();
    handle.cancel();
    let err = s.auth.users.add(&ctx, User::new("alice")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    let err = s.explorations.add(&ctx, Exploration::new(UserId(1), "x", "")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    let err = s.dashboards.add(&ctx, Dashboard::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let expired = RequestContext::background().with_timeout(Duration::ZERO);
    let err = s.auth.roles.add(&expired, Role::new("ops")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let live = RequestContext::background();
    assert!(s.explorations.query(&live, UserId(1)).await?.is_empty());
    assert!(s.dashboards.list(&live).await?.is_empty());
    let alice = s.auth.users.add(&live, User::new("alice")).await?;
    assert_eq!(alice.id, UserId(1));
    s.auth.roles.add(&live, Role::new("ops")).await?;
    Ok(())
}

/// Cancel each write at a different point in flight. A call that reports
/// `Cancelled` must leave nothing behind, and one that succeeds must be
/// visible.
async fn cancel_in_flight_is_all_or_nothing(s: Stores) -> Result<()> {
    let live = RequestContext::background();
    let mut cancelled = 0;
    for attempt in 0..300u64 {
        let (ctx, handle) = live.with_cancel();
        let delay = Duration::from_micros(attempt % 40 * 10);
        if delay.is_zero() {
            handle.cancel();
        }
        let cancel = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.cancel();
        });

        let before = s.dashboards.list(&live).await?.len();
        let res = s.dashboards.add(&ctx, Dashboard::new([Cell::new(0, 0, 1, 1)])).await;
        let after = s.dashboards.list(&live).await?.len();
        match res {
            Ok(_) => assert_eq!(after, before + 1),
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Cancelled);
                assert_eq!(after, before);
                cancelled += 1;
            }
        }

        let name = format!("user{attempt}");
        let res = s.auth.users.add(&ctx, User::new(name.as_str())).await;
        let retry = s.auth.users.add(&live, User::new(name.as_str())).await;
        match res {
            Ok(_) => assert_eq!(retry.unwrap_err().kind(), ErrorKind::Duplicate),
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Cancelled);
                retry?;
            }
        }
        cancel.await?;
    }
    assert!(cancelled >= 8);
    Ok(())
}

macro_rules! contract_suite {
    ($backend:ident, $factory:path) => {
        mod $backend {
            use super::*;

            #[tokio::test]
            async fn catalog_lists_seed_in_order() -> Result<()> { super::catalog_lists_seed_in_order($factory().await?).await }
            #[tokio::test]
            async fn user_round_trip() -> Result<()> { super::user_round_trip($factory().await?).await }
            #[tokio::test]
            async fn admin_role_grants_read_and_write() -> Result<()> { super::admin_role_grants_read_and_write($factory().await?).await }
            #[tokio::test]
            async fn membership_views_are_shallow_and_sorted() -> Result<()> { super::membership_views_are_shallow_and_sorted($factory().await?).await }
            #[tokio::test]
            async fn deleting_detaches_memberships() -> Result<()> { super::deleting_detaches_memberships($factory().await?).await }
            #[tokio::test]
            async fn names_are_unique() -> Result<()> { super::names_are_unique($factory().await?).await }
            #[tokio::test]
            async fn invalid_input_is_rejected() -> Result<()> { super::invalid_input_is_rejected($factory().await?).await }
            #[tokio::test]
            async fn exploration_timestamps() -> Result<()> { super::exploration_timestamps($factory().await?).await }
            #[tokio::test]
            async fn query_is_isolated_per_user() -> Result<()> { super::query_is_isolated_per_user($factory().await?).await }
            #[tokio::test]
            async fn delete_then_get_is_not_found() -> Result<()> { super::delete_then_get_is_not_found($factory().await?).await }
            #[tokio::test]
            async fn update_of_missing_record_changes_nothing() -> Result<()> { super::update_of_missing_record_changes_nothing($factory().await?).await }
            #[tokio::test]
            async fn dashboard_cells_are_replaced() -> Result<()> { super::dashboard_cells_are_replaced($factory().await?).await }
            #[tokio::test]
            async fn ids_are_never_reused() -> Result<()> { super::ids_are_never_reused($factory().await?).await }
            #[tokio::test]
            async fn cancelled_context_stores_nothing() -> Result<()> { super::cancelled_context_stores_nothing($factory().await?).await }
            #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
            async fn cancel_in_flight_is_all_or_nothing() -> Result<()> { super::cancel_in_flight_is_all_or_nothing($factory().await?).await }
        }
    };
}

contract_suite!(memory, memory_stores);
contract_suite!(snapshot, snapshot_stores);
contract_suite!(sqlite, sqlite_stores);

#[tokio::test]
async fn snapshot_reload_keeps_records_and_counters() -> Result<()> {
    let dir = temp_dir();
    let mut cfg = base_config();
    cfg.storage.snapshot_dir = Some(dir.clone());
    cfg.normalize_and_validate()?;
    let ctx = RequestContext::background();

    let (alice, gone, dash) = {
        let s = build_stores(&cfg).await?;
        let ops = s.auth.roles.add(&ctx, Role::new("ops").with_permissions(["admin"])).await?;
        let alice = s.auth.users.add(&ctx, User::new("alice").with_roles([ops])).await?;
        let gone = s.explorations.add(&ctx, Exploration::new(alice.id, "old", "")).await?;
        s.explorations.delete(&ctx, &gone).await?;
        let dash = s.dashboards.add(&ctx, Dashboard::new([Cell::new(1, 2, 3, 4).with_queries(["q"])])).await?;
        (alice, gone, dash)
    };

    // A second seed entry shows up after reopening; existing ones are kept.
    cfg.auth.permissions.push("export".into());
    let s = build_stores(&cfg).await?;
    assert_eq!(s.auth.users.get(&ctx, alice.id).await?, alice);
    assert_eq!(names(&s.auth.effective_permissions(&ctx, alice.id).await?), vec!["admin"]);
    assert_eq!(s.dashboards.get(&ctx, dash.id).await?, dash);
    let next = s.explorations.add(&ctx, Exploration::new(alice.id, "new", "")).await?;
    assert!(next.id > gone.id);
    let all = s.auth.permissions.all(&ctx).await?;
    assert_eq!(names(&all), vec!["read", "write", "admin", "export"]);

    let _ = tokio::fs::remove_dir_all(&dir).await;
    Ok(())
}

#[tokio::test]
async fn child_of_cancelled_context_is_refused() -> Result<()> {
    let s = memory_stores().await?;
    let (ctx, handle) = RequestContext::background().with_cancel();
    handle.cancel();
    let child = ctx.with_timeout(Duration::from_secs(60));
    let err = s.dashboards.update(&child, &Dashboard { id: DashboardId(1), cells: Vec::new() }).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(err.is_retryable());
    Ok(())
}
