//! PostgreSQL integration tests
//!
//! Run against a scratch database with
//! `TRELLIS_TEST_DATABASE_URL=postgres://... cargo test -p trellis-db -- --ignored`

use chrono::Utc;
use trellis_core::{
    DataStore, Filter, Group, Identity, Provider, ProviderKind, ProviderUser, Settings,
    SyncCommit, TokenBundle,
};
use trellis_db::{create_pool, run_migrations, DatabaseConfig, PgStore};

async fn store() -> PgStore {
    let url = std::env::var("TRELLIS_TEST_DATABASE_URL")
        .expect("TRELLIS_TEST_DATABASE_URL must be set for ignored tests");
    let pool = create_pool(&DatabaseConfig {
        url,
        min_connections: 0,
        ..Default::default()
    })
    .await
    .expect("connect");
    run_migrations(&pool).await.expect("migrate");
    PgStore::new(pool)
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::now_v7())
}

#[tokio::test]
#[ignore]
async fn test_identity_name_conflict() {
    let store = store().await;
    let name = unique("user");
    store.identities().create(&Identity::new(&name)).await.unwrap();

    let err = store
        .identities()
        .create(&Identity::new(&name))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
#[ignore]
async fn test_commit_sync_round_trip() {
    let store = store().await;
    let identity = store
        .identities()
        .create(&Identity::new(unique("user")))
        .await
        .unwrap();
    let provider = store
        .providers()
        .create(&Provider::new(
            unique("idp"),
            ProviderKind::Oidc,
            "https://idp.example.com",
            "client",
            "secret",
        ))
        .await
        .unwrap();
    let kept = store.groups().create(&Group::new(unique("kept"))).await.unwrap();
    let stale = store.groups().create(&Group::new(unique("stale"))).await.unwrap();
    let fresh = store.groups().create(&Group::new(unique("fresh"))).await.unwrap();
    store.memberships().add_membership(identity.id, kept.id).await.unwrap();
    store.memberships().add_membership(identity.id, stale.id).await.unwrap();

    let mut pu = ProviderUser::new(identity.id, provider.id, "user@example.com");
    pu.groups = [fresh.name.clone()].into_iter().collect();
    pu.tokens = TokenBundle {
        access_token: "at".into(),
        refresh_token: "rt".into(),
        expires_at: Some(Utc::now()),
    };

    let commit = SyncCommit {
        identity_id: identity.id,
        add: vec![fresh.id],
        remove: vec![stale.id],
        provider_user: pu,
        last_seen_at: Utc::now(),
    };
    store.memberships().commit_sync(&commit).await.unwrap();
    store.memberships().commit_sync(&commit).await.unwrap();

    let loaded = store
        .identities()
        .find(&Filter::new().by_id(identity.id))
        .await
        .unwrap()
        .unwrap();
    let names = loaded.group_names();
    assert!(names.contains(&kept.name));
    assert!(names.contains(&fresh.name));
    assert!(!names.contains(&stale.name));
    assert!(loaded.last_seen_at.is_some());

    let stored = store
        .provider_users()
        .find(identity.id, provider.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.tokens.refresh_token, "rt");
    assert!(stored.groups.contains(&fresh.name));
}

#[tokio::test]
#[ignore]
async fn test_settings_upsert() {
    let store = store().await;
    let saved = store
        .settings()
        .save(&Settings {
            length_min: 12,
            symbol_min: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(saved.updated_at.is_some());

    let loaded = store.settings().get().await.unwrap();
    assert_eq!(loaded.length_min, 12);
    assert_eq!(loaded.symbol_min, 1);
}
