mod common;

use axum::http::StatusCode;
use common::{
    TempDbFile, body_json, create_test_app, create_test_app_at, create_test_app_with, get, login,
    post_json, register, request_reset_token, send,
};
use serde_json::json;
use sessiongate::db::UserRepository;
use sessiongate::mailer::RecordingMailer;
use sessiongate::password::verify_password;
use tower::ServiceExt;

const VALIDATE: &str = "/api/auth/password-reset/validate";
const CONFIRM: &str = "/api/auth/password-reset/confirm";

#[tokio::test]
async fn test_request_mails_reset_link() {
    let app = create_test_app().await;
    register(&app, "alice@example.com", "hunter22").await;

    let token = request_reset_token(&app, "alice@example.com").await;

    let mail = app.mailer.last().unwrap();
    assert_eq!(mail.to, vec!["alice@example.com".to_string()]);
    assert_eq!(mail.subject, "Password Reset Request");
    assert!(!token.is_empty());
}

#[tokio::test]
async fn test_request_for_unknown_email_is_accepted_silently() {
    let app = create_test_app().await;

    let response = send(
        &app,
        post_json(
            "/api/auth/password-reset/request",
            None,
            json!({ "email": "nobody@example.com" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_mail_failure_is_reported() {
    let app = create_test_app_with(RecordingMailer::failing()).await;
    register(&app, "alice@example.com", "hunter22").await;

    let response = send(
        &app,
        post_json(
            "/api/auth/password-reset/request",
            None,
            json!({ "email": "alice@example.com" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await, json!({ "error": "Internal error" }));
}

#[tokio::test]
async fn test_validate_does_not_consume() {
    let app = create_test_app().await;
    register(&app, "alice@example.com", "hunter22").await;
    let token = request_reset_token(&app, "alice@example.com").await;

    for _ in 0..2 {
        let response = send(&app, get(VALIDATE, Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_confirm_changes_password_once() {
    let app = create_test_app().await;
    register(&app, "alice@example.com", "hunter22").await;
    let token = request_reset_token(&app, "alice@example.com").await;

    let response = send(
        &app,
        post_json(CONFIRM, Some(&token), json!({ "new_password": "new-password" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        login(&app, "alice@example.com", "hunter22").await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        login(&app, "alice@example.com", "new-password").await.status(),
        StatusCode::OK
    );

    // A consumed token neither validates nor confirms again
    let response = send(&app, get(VALIDATE, Some(&token))).await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

    let response = send(
        &app,
        post_json(CONFIRM, Some(&token), json!({ "new_password": "third-password" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(
        login(&app, "alice@example.com", "new-password").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_confirm_requires_new_password() {
    let app = create_test_app().await;
    register(&app, "alice@example.com", "hunter22").await;
    let token = request_reset_token(&app, "alice@example.com").await;

    let response = send(
        &app,
        post_json(CONFIRM, Some(&token), json!({ "new_password": "" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The token survives a rejected attempt
    let response = send(&app, get(VALIDATE, Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_new_request_supersedes_earlier_token() {
    let app = create_test_app().await;
    register(&app, "alice@example.com", "hunter22").await;

    let first = request_reset_token(&app, "alice@example.com").await;
    let second = request_reset_token(&app, "alice@example.com").await;
    assert_ne!(first, second);

    let response = send(&app, get(VALIDATE, Some(&first))).await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

    let response = send(&app, get(VALIDATE, Some(&second))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_access_token_cannot_confirm_reset() {
    let app = create_test_app().await;
    let tokens = register(&app, "alice@example.com", "hunter22").await;
    let access = tokens["access_token"].as_str().unwrap();

    let response = send(
        &app,
        post_json(CONFIRM, Some(access), json!({ "new_password": "new-password" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Register, forget the password, reset it through the mailed link, log in.
#[tokio::test]
async fn test_full_reset_flow() {
    let app = create_test_app().await;
    register(&app, "alice@example.com", "old-password").await;

    let token = request_reset_token(&app, "Alice@Example.com").await;
    assert_eq!(
        send(&app, get(VALIDATE, Some(&token))).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        send(
            &app,
            post_json(CONFIRM, Some(&token), json!({ "new_password": "new-password" })),
        )
        .await
        .status(),
        StatusCode::OK
    );

    let response = login(&app, "alice@example.com", "new-password").await;
    assert_eq!(response.status(), StatusCode::OK);
    let tokens = body_json(response).await;
    let me = body_json(send(&app, get("/api/me", tokens["access_token"].as_str())).await).await;
    assert_eq!(me["email"], "alice@example.com");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirms_have_one_winner() {
    const ATTEMPTS: usize = 8;

    let db_file = TempDbFile::new();
    let app = create_test_app_at(db_file.path(), RecordingMailer::new()).await;
    register(&app, "alice@example.com", "old-password").await;
    let token = request_reset_token(&app, "alice@example.com").await;

    let attempts = (0..ATTEMPTS).map(|i| {
        let router = app.router.clone();
        let request = post_json(
            CONFIRM,
            Some(&token),
            json!({ "new_password": format!("new-password-{i}") }),
        );
        tokio::spawn(async move { router.oneshot(request).await.map(|r| r.status()) })
    });
    let statuses: Vec<StatusCode> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let winners: Vec<usize> = statuses
        .iter()
        .enumerate()
        .filter(|(_, status)| **status == StatusCode::OK)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(winners.len(), 1, "statuses: {:?}", statuses);
    assert_eq!(
        statuses
            .iter()
            .filter(|status| **status == StatusCode::PRECONDITION_FAILED)
            .count(),
        ATTEMPTS - 1,
        "statuses: {:?}",
        statuses
    );

    // The stored hash is the winner's password
    let winner = format!("new-password-{}", winners[0]);
    let user = app
        .db
        .users()
        .get_user_by_email("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(verify_password(&winner, &user.password_hash).await.unwrap());
    assert_eq!(
        login(&app, "alice@example.com", &winner).await.status(),
        StatusCode::OK
    );
}
