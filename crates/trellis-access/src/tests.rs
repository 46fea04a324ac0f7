//! Credential service tests against the in-memory store

use std::sync::Arc;

use trellis_core::{DataStore, Identity, Settings, TrellisError};
use trellis_db::MemoryStore;

use crate::credential::{CredentialService, UpdateCredentialRequest};
use crate::password::verify_password;

async fn setup() -> (Arc<MemoryStore>, CredentialService, Identity) {
    let store = Arc::new(MemoryStore::new());
    let service = CredentialService::new(store.clone());
    let user = store
        .identities()
        .create(&Identity::new("bruce@example.com"))
        .await
        .unwrap();
    (store, service, user)
}

fn admin() -> Identity {
    Identity::new("admin@example.com")
}

#[tokio::test]
async fn test_create_credential_generates_one_time_password() {
    let (store, service, user) = setup().await;

    let password = service.create_credential(&user, None).await.unwrap();
    assert!(!password.is_empty());

    let credential = store
        .credentials()
        .find_by_identity(user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(credential.one_time_password);
    assert!(verify_password(&password, &credential.password_hash));
}

#[tokio::test]
async fn test_create_credential_twice_conflicts() {
    let (_, service, user) = setup().await;
    service.create_credential(&user, None).await.unwrap();

    let err = service.create_credential(&user, None).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_create_credential_checks_explicit_password() {
    let (_, service, user) = setup().await;
    service
        .save_settings(&Settings {
            length_min: 8,
            ..Default::default()
        })
        .await
        .unwrap();

    let err = service
        .create_credential(&user, Some("short"))
        .await
        .unwrap_err();
    assert!(matches!(err, TrellisError::PolicyViolation { .. }));
}

#[tokio::test]
async fn test_generated_password_respects_stored_policy() {
    let (_, service, user) = setup().await;
    service
        .save_settings(&Settings {
            length_min: 20,
            uppercase_min: 2,
            number_min: 2,
            symbol_min: 2,
            ..Default::default()
        })
        .await
        .unwrap();

    let password = service.create_credential(&user, None).await.unwrap();
    assert_eq!(password.chars().count(), 20);
    assert!(service.check_password(&password).await.is_ok());
}

#[tokio::test]
async fn test_settings_password_requirements() {
    let (_, service, user) = setup().await;
    service.create_credential(&user, None).await.unwrap();
    let admin = admin();

    service
        .save_settings(&Settings {
            length_min: 8,
            ..Default::default()
        })
        .await
        .unwrap();
    let err = service
        .update_credential(&admin, &user, "short")
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("does not pass requirements"));
    assert!(message.contains("needs minimum length of 8"));

    let mut settings = service.settings().await.unwrap();
    settings.length_min = 5;
    service.save_settings(&settings).await.unwrap();
    service.update_credential(&admin, &user, "short").await.unwrap();
    service.update_credential(&admin, &user, "longer").await.unwrap();

    settings.length_min = 10;
    settings.symbol_min = 1;
    service.save_settings(&settings).await.unwrap();
    let err = service
        .update_credential(&admin, &user, "badpw")
        .await
        .unwrap_err();
    match err {
        TrellisError::PolicyViolation { violations } => {
            assert_eq!(
                violations,
                vec!["needs minimum length of 10", "needs minimum 1 symbols"]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_rejected_update_leaves_credential_untouched() {
    let (store, service, user) = setup().await;
    let original = service.create_credential(&user, None).await.unwrap();
    let before = store
        .credentials()
        .find_by_identity(user.id)
        .await
        .unwrap()
        .unwrap();

    service
        .save_settings(&Settings {
            length_min: 10,
            number_min: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    let err = service
        .update_credential(&user, &user, "short")
        .await
        .unwrap_err();
    assert!(matches!(err, TrellisError::PolicyViolation { .. }));

    let after = store
        .credentials()
        .find_by_identity(user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.password_hash, before.password_hash);
    assert!(after.one_time_password);
    assert!(verify_password(&original, &after.password_hash));
    assert!(!verify_password("short", &after.password_hash));
}

#[tokio::test]
async fn test_update_credential_one_time_flag() {
    let (store, service, user) = setup().await;
    service.create_credential(&user, None).await.unwrap();

    service
        .update_credential(&admin(), &user, "newPassword")
        .await
        .unwrap();
    let credential = store
        .credentials()
        .find_by_identity(user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(credential.one_time_password);

    service
        .update_credential(&user, &user, "newPassword")
        .await
        .unwrap();
    let credential = store
        .credentials()
        .find_by_identity(user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!credential.one_time_password);
    assert!(verify_password("newPassword", &credential.password_hash));
}

#[tokio::test]
async fn test_update_without_credential_is_not_found() {
    let (_, service, user) = setup().await;
    let err = service
        .update_credential(&user, &user, "whatever")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_request_is_validated() {
    let (_, service, user) = setup().await;
    service.create_credential(&user, None).await.unwrap();

    let err = service
        .update(
            &user,
            &UpdateCredentialRequest {
                identity_id: user.id,
                password: "".into(),
            },
        )
        .await
        .unwrap_err();
    match err {
        TrellisError::Validation(errors) => {
            assert_eq!(errors.get("password").unwrap(), ["a value is required"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    service
        .update(
            &user,
            &UpdateCredentialRequest {
                identity_id: user.id,
                password: "fresh-password".into(),
            },
        )
        .await
        .unwrap();
    assert!(service.verify(user.id, "fresh-password").await.is_ok());
}

#[tokio::test]
async fn test_whitespace_password_follows_policy() {
    let (_, service, user) = setup().await;
    service.create_credential(&user, None).await.unwrap();
    service
        .save_settings(&Settings {
            length_min: 8,
            symbol_min: 1,
            ..Default::default()
        })
        .await
        .unwrap();

    let spaces = " ".repeat(8);
    assert!(service.check_password(&spaces).await.is_ok());
    service
        .update(
            &user,
            &UpdateCredentialRequest {
                identity_id: user.id,
                password: spaces.clone(),
            },
        )
        .await
        .unwrap();
    assert!(service.verify(user.id, &spaces).await.is_ok());
}

#[tokio::test]
async fn test_save_settings_rejects_unsatisfiable_policy() {
    let (_, service, _) = setup().await;

    let err = service
        .save_settings(&Settings {
            length_min: u32::MAX,
            ..Default::default()
        })
        .await
        .unwrap_err();
    match err {
        TrellisError::Validation(errors) => {
            assert!(errors.get("length_min").is_some());
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = service
        .save_settings(&Settings {
            lowercase_min: 600,
            symbol_min: 600,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TrellisError::Validation(_)));

    let stored = service.settings().await.unwrap();
    assert!(stored.length_min < 1024);
}

#[tokio::test]
async fn test_verify() {
    let (_, service, user) = setup().await;
    let password = service.create_credential(&user, None).await.unwrap();

    let credential = service.verify(user.id, &password).await.unwrap();
    assert!(credential.one_time_password);

    let err = service.verify(user.id, "wrong").await.unwrap_err();
    assert!(matches!(err, TrellisError::AuthenticationFailed { .. }));

    let stranger = Identity::new("nobody@example.com");
    let err = service.verify(stranger.id, "anything").await.unwrap_err();
    assert!(matches!(err, TrellisError::AuthenticationFailed { .. }));
}
