//! Registration, authentication, and credential lifecycle tests.

mod common;

use common::{test_password, TestApp};
use gatehouse::utils::Password;
use gatehouse::AuthError;

#[tokio::test]
async fn register_then_authenticate_succeeds() {
    let app = TestApp::spawn();

    let user = app.register("ada@example.com").await;
    assert_eq!(user.email, "ada@example.com");
    assert!(user.is_active);

    let session = app.login("ada@example.com").await;
    assert_eq!(session.user_id, user.user_id);
    assert_eq!(session.tokens.token_type, "Bearer");

    let subject = app
        .auth
        .validate_access_token(&session.tokens.access_token)
        .expect("Failed to validate access token");
    assert_eq!(subject, user.user_id);
}

#[tokio::test]
async fn duplicate_email_is_rejected_case_insensitively() {
    let app = TestApp::spawn();
    app.register("ada@example.com").await;

    let err = app
        .auth
        .register_user("ADA@Example.COM", test_password())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::EmailAlreadyRegistered));
}

#[tokio::test]
async fn wrong_password_and_unknown_email_fail_the_same_way() {
    let app = TestApp::spawn();
    app.register("ada@example.com").await;

    let err = app
        .auth
        .authenticate("ada@example.com", Password::new("not-the-password".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationFailed));

    let err = app
        .auth
        .authenticate("nobody@example.com", test_password())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationFailed));
}

#[tokio::test]
async fn malformed_email_is_rejected_at_registration() {
    let app = TestApp::spawn();

    for email in ["", "no-at-sign", "@example.com", "user@", "user@nodot"] {
        let err = app
            .auth
            .register_user(email, test_password())
            .await
            .unwrap_err();
        assert!(
            matches!(err, AuthError::InvalidEmail(_)),
            "{email:?} should have been rejected"
        );
    }
}

#[tokio::test]
async fn short_password_is_rejected_at_registration() {
    let app = TestApp::spawn();

    let err = app
        .auth
        .register_user("ada@example.com", Password::new("short".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidPassword(_)));
}

#[tokio::test]
async fn lookup_by_id_and_email() {
    let app = TestApp::spawn();
    let user = app.register("ada@example.com").await;

    let by_id = app.auth.get_user(user.user_id).await.expect("Failed to get user");
    assert_eq!(by_id.email, "ada@example.com");

    let by_email = app
        .auth
        .get_user_by_email("ada@example.com")
        .await
        .expect("Failed to get user by email");
    assert_eq!(by_email.user_id, user.user_id);

    let err = app.auth.get_user(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound));
}

#[tokio::test]
async fn change_password_swaps_the_accepted_credential() {
    let app = TestApp::spawn();
    let user = app.register("ada@example.com").await;

    // Wrong current password is an authentication failure, not a policy one.
    let err = app
        .auth
        .change_password(
            user.user_id,
            Password::new("not-the-password".into()),
            Password::new("a-new-long-password".into()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationFailed));

    // A new password that fails policy leaves the old one in place.
    let err = app
        .auth
        .change_password(user.user_id, test_password(), Password::new("short".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidPassword(_)));
    app.login("ada@example.com").await;

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
        .authenticate("ada@example.com", test_password())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationFailed));

    app.auth
        .authenticate("ada@example.com", Password::new("a-new-long-password".into()))
        .await
        .expect("Failed to authenticate with new password");
}

#[tokio::test]
async fn deactivated_user_cannot_authenticate_or_refresh() {
    let app = TestApp::spawn();
    let user = app.register("ada@example.com").await;
    let session = app.login("ada@example.com").await;

    app.auth
        .deactivate_user(user.user_id)
        .await
        .expect("Failed to deactivate");

    let err = app
        .auth
        .authenticate("ada@example.com", test_password())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationFailed));

    // The outstanding refresh token died with the deactivation.
    let err = app
        .auth
        .refresh(&session.tokens.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RevokedToken));

    // Deactivating again is a no-op, not an error.
    app.auth
        .deactivate_user(user.user_id)
        .await
        .expect("Deactivation should be idempotent");
}
