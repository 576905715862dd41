//! Refresh rotation, logout, and revocation ledger tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use common::{expired_refresh_config, test_password, TestApp};
use gatehouse::store::RevocationLedger;
use gatehouse::utils::Password;
use gatehouse::AuthError;

#[tokio::test]
async fn refresh_rotates_the_pair_and_consumes_the_old_token() {
    let app = TestApp::spawn();
    app.register("ada@example.com").await;
    let session = app.login("ada@example.com").await;

    let rotated = app
        .auth
        .refresh(&session.tokens.refresh_token)
        .await
        .expect("Failed to refresh");
    assert_ne!(rotated.refresh_token, session.tokens.refresh_token);

    // The consumed token is dead for every later presentation.
    let err = app
        .auth
        .refresh(&session.tokens.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RevokedToken));

    // The replacement works.
    app.auth
        .refresh(&rotated.refresh_token)
        .await
        .expect("Failed to refresh with rotated token");
}

#[tokio::test]
async fn concurrent_refreshes_have_exactly_one_winner() {
    let app = TestApp::spawn();
    app.register("ada@example.com").await;
    let session = app.login("ada@example.com").await;
    let contested = session.tokens.refresh_token;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let auth = Arc::clone(&app.auth);
        let token = contested.clone();
        handles.push(tokio::spawn(async move { auth.refresh(&token).await }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.await.expect("refresh task panicked") {
            Ok(_) => winners += 1,
            Err(AuthError::RevokedToken) => losers += 1,
            Err(other) => panic!("unexpected refresh error: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(losers, 7);
}

#[tokio::test]
async fn logout_kills_the_refresh_token_but_not_the_access_token() {
    let app = TestApp::spawn();
    let user = app.register("ada@example.com").await;
    let session = app.login("ada@example.com").await;

    app.auth
        .logout(&session.tokens.refresh_token)
        .await
        .expect("Failed to logout");

    let err = app
        .auth
        .refresh(&session.tokens.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RevokedToken));

    // Access validation is a pure signature-and-expiry check, so the access
    // token issued before logout keeps working until it expires on its own.
    let subject = app
        .auth
        .validate_access_token(&session.tokens.access_token)
        .expect("Access token should outlive logout");
    assert_eq!(subject, user.user_id);
}

#[tokio::test]
async fn logout_is_idempotent_and_swallows_dead_tokens() {
    let app = TestApp::spawn();
    app.register("ada@example.com").await;
    let session = app.login("ada@example.com").await;

    app.auth
        .logout(&session.tokens.refresh_token)
        .await
        .expect("Failed to logout");
    app.auth
        .logout(&session.tokens.refresh_token)
        .await
        .expect("Second logout should be a no-op");

    app.auth
        .logout("garbage.token.value")
        .await
        .expect("Logout with garbage should be a no-op");

    let expired_app = TestApp::spawn_with(expired_refresh_config());
    expired_app.register("bob@example.com").await;
    let expired_session = expired_app.login("bob@example.com").await;
    expired_app
        .auth
        .logout(&expired_session.tokens.refresh_token)
        .await
        .expect("Logout with an expired token should be a no-op");
}

#[tokio::test]
async fn expired_refresh_token_is_reported_as_expired() {
    let app = TestApp::spawn_with(expired_refresh_config());
    app.register("ada@example.com").await;
    let session = app.login("ada@example.com").await;

    let err = app
        .auth
        .refresh(&session.tokens.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ExpiredToken));
}

#[tokio::test]
async fn token_kinds_cannot_stand_in_for_each_other() {
    let app = TestApp::spawn();
    app.register("ada@example.com").await;
    let session = app.login("ada@example.com").await;

    let err = app
        .auth
        .refresh(&session.tokens.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MalformedToken));

    let err = app
        .auth
        .validate_access_token(&session.tokens.refresh_token)
        .unwrap_err();
    assert!(matches!(err, AuthError::MalformedToken));
}

#[tokio::test]
async fn change_password_revokes_refresh_but_not_access() {
    let app = TestApp::spawn();
    let user = app.register("ada@example.com").await;
    let session = app.login("ada@example.com").await;

    app.auth
        .change_password(
            user.user_id,
            test_password(),
            Password::new("a-new-long-password".into()),
        )
        .await
        .expect("Failed to change password");

    let err = app
        .auth
        .refresh(&session.tokens.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RevokedToken));

    app.auth
        .validate_access_token(&session.tokens.access_token)
        .expect("Access token should outlive the password change");

    // The cutoff has whole-second resolution; step past it before issuing
    // the next session so its tokens are unambiguously newer.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let session = app
        .auth
        .authenticate("ada@example.com", Password::new("a-new-long-password".into()))
        .await
        .expect("Failed to authenticate with new password");
    app.auth
        .refresh(&session.tokens.refresh_token)
        .await
        .expect("Post-change refresh token should work");
}

#[tokio::test]
async fn prune_drops_only_entries_past_retention() {
    let app = TestApp::spawn();

    // One entry whose token expired well past the 48 hour retention window,
    // one still inside it.
    let stale = Uuid::new_v4();
    let fresh = Uuid::new_v4();
    app.store
        .revoke_token(stale, Utc::now() - chrono::Duration::hours(72))
        .await
        .expect("Failed to seed stale entry");
    app.store
        .revoke_token(fresh, Utc::now() + chrono::Duration::hours(24))
        .await
        .expect("Failed to seed fresh entry");

    let removed = app
        .auth
        .prune_expired_tokens()
        .await
        .expect("Failed to prune");
    assert_eq!(removed, 1);

    assert!(!app.store.is_revoked(stale).await.expect("ledger lookup"));
    assert!(app.store.is_revoked(fresh).await.expect("ledger lookup"));
}
