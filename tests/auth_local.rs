use quillpad::auth::{AuthClient, AuthError, AuthEvent, LocalAuth};

#[tokio::test]
async fn sign_up_sign_out_sign_in_cycle_emits_events() {
    let auth = LocalAuth::default();
    let mut events = auth.subscribe();

    let user = auth
        .sign_up("Writer@Example.com", "hunter22", "")
        .await
        .expect("sign up");
    assert_eq!(user.email, "writer@example.com");
    assert_eq!(user.display_name, "writer");
    assert_eq!(auth.current_user().await, Some(user.clone()));
    assert_eq!(events.recv().await.expect("event"), AuthEvent::SignedIn(user.clone()));

    auth.sign_out().await.expect("sign out");
    assert_eq!(auth.current_user().await, None);
    assert_eq!(events.recv().await.expect("event"), AuthEvent::SignedOut);

    let again = auth
        .sign_in("writer@example.com", "hunter22")
        .await
        .expect("sign in");
    assert_eq!(again, user);
    assert_eq!(events.recv().await.expect("event"), AuthEvent::SignedIn(user));
}

#[tokio::test]
async fn bad_credentials_and_duplicates_are_rejected() {
    let auth = LocalAuth::default();
    auth.sign_up("ann@example.com", "secret1", "Ann")
        .await
        .expect("sign up");
    auth.sign_out().await.expect("sign out");

    assert_eq!(
        auth.sign_in("ann@example.com", "secret2").await,
        Err(AuthError::InvalidCredentials)
    );
    assert_eq!(
        auth.sign_in("bob@example.com", "secret1").await,
        Err(AuthError::InvalidCredentials)
    );
    assert_eq!(
        auth.sign_up("ANN@example.com", "another1", "Ann").await,
        Err(AuthError::EmailTaken)
    );
    assert_eq!(
        auth.sign_up("new@example.com", "short", "New").await,
        Err(AuthError::WeakPassword)
    );
    assert_eq!(
        auth.sign_up("not-an-email", "longenough", "X").await,
        Err(AuthError::InvalidEmail)
    );
    assert_eq!(auth.current_user().await, None);
}

#[tokio::test]
async fn signing_out_twice_emits_one_event() {
    let auth = LocalAuth::default();
    auth.sign_up("cy@example.com", "password", "Cy")
        .await
        .expect("sign up");
    let mut events = auth.subscribe();

    auth.sign_out().await.expect("sign out");
    auth.sign_out().await.expect("sign out");

    assert_eq!(events.recv().await.expect("event"), AuthEvent::SignedOut);
    assert!(events.try_recv().is_err());
}
