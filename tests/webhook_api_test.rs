mod common;

use axum::{body::Body, http::{Request, StatusCode}};
use common::*;
use menuqr::{
    domain::SubscriptionStatus,
    payments::SIGNATURE_HEADER,
    repository::SubscriptionRepository,
};

const ACTIVATED: &str = r#"{"entity":"event","event":"subscription.activated","created_at":1700000100,"payload":{"subscription":{"entity":{"id":"sub_live1","current_start":1700000000,"current_end":1702592000}}}}"#;

#[tokio::test]
async fn test_missing_secret_rejects_everything() -> anyhow::Result<()> {
    let app = spawn_app(None).await?;
    insert_subscription(&app.pool, "sub_live1", SubscriptionStatus::Pending).await?;

    // Even a body signed with what would be the right secret is refused.
    let response = app.send(signed_webhook(ACTIVATED, WEBHOOK_SECRET)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let sub = app.context.subscription_repo.find_by_provider_id("sub_live1").await?.unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized() -> anyhow::Result<()> {
    let app = spawn_app(Some(WEBHOOK_SECRET)).await?;

    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/webhook/razorpay")
        .header("content-type", "application/json")
        .body(Body::from(ACTIVATED))?;
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_tampered_body_is_unauthorized() -> anyhow::Result<()> {
    let app = spawn_app(Some(WEBHOOK_SECRET)).await?;
    insert_subscription(&app.pool, "sub_live1", SubscriptionStatus::Pending).await?;

    let signature = menuqr::payments::webhook::compute_signature(WEBHOOK_SECRET, ACTIVATED.as_bytes());
    let tampered = ACTIVATED.replace("subscription.activated", "subscription.cancelled");
    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/webhook/razorpay")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(tampered))?;
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let sub = app.context.subscription_repo.find_by_provider_id("sub_live1").await?.unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() -> anyhow::Result<()> {
    let app = spawn_app(Some(WEBHOOK_SECRET)).await?;
    let response = app.send(signed_webhook(ACTIVATED, "someone_else")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() -> anyhow::Result<()> {
    let app = spawn_app(Some(WEBHOOK_SECRET)).await?;
    let response = app.send(signed_webhook("{not json", WEBHOOK_SECRET)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_valid_event_updates_subscription() -> anyhow::Result<()> {
    let app = spawn_app(Some(WEBHOOK_SECRET)).await?;
    insert_subscription(&app.pool, "sub_live1", SubscriptionStatus::Pending).await?;

    let response = app.send(signed_webhook(ACTIVATED, WEBHOOK_SECRET)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "ok": true }));

    let sub = app.context.subscription_repo.find_by_provider_id("sub_live1").await?.unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.current_period_end.is_some());
    Ok(())
}

#[tokio::test]
async fn test_unknown_subscription_is_acknowledged_without_insert() -> anyhow::Result<()> {
    let app = spawn_app(Some(WEBHOOK_SECRET)).await?;

    let response = app.send(signed_webhook(ACTIVATED, WEBHOOK_SECRET)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["ignored"], "subscription not found");

    assert_eq!(app.context.subscription_repo.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_unhandled_event_is_acknowledged() -> anyhow::Result<()> {
    let app = spawn_app(Some(WEBHOOK_SECRET)).await?;
    insert_subscription(&app.pool, "sub_live1", SubscriptionStatus::Active).await?;

    let body = r#"{"event":"order.paid","payload":{"subscription":{"entity":{"id":"sub_live1"}}}}"#;
    let response = app.send(signed_webhook(body, WEBHOOK_SECRET)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ignored"], "unhandled event");
    Ok(())
}

#[tokio::test]
async fn test_database_failure_is_server_error() -> anyhow::Result<()> {
    let app = spawn_app(Some(WEBHOOK_SECRET)).await?;
    insert_subscription(&app.pool, "sub_live1", SubscriptionStatus::Pending).await?;
    app.pool.close().await;

    let response = app.send(signed_webhook(ACTIVATED, WEBHOOK_SECRET)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test]
async fn test_unexpected_shapes_are_acknowledged() -> anyhow::Result<()> {
    let app = spawn_app(Some(WEBHOOK_SECRET)).await?;
    insert_subscription(&app.pool, "sub_live1", SubscriptionStatus::Pending).await?;

    let bodies = [
        r#"{}"#,
        r#"[1, 2, 3]"#,
        r#"{"event":"order.paid","payload":null}"#,
        r#"{"event":"subscription.activated","payload":{"subscription":{"entity":{"id":12345}}}}"#,
    ];
    for body in bodies {
        let response = app.send(signed_webhook(body, WEBHOOK_SECRET)).await;
        assert_eq!(response.status(), StatusCode::OK, "body: {}", body);
        let json = body_json(response).await;
        assert_eq!(json["ok"], true);
        assert!(json["ignored"].is_string(), "body: {}", body);
    }

    let response = app
        .send(signed_webhook(
            r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":12345}}}}"#,
            WEBHOOK_SECRET,
        ))
        .await;
    assert_eq!(body_json(response).await["ignored"], "unrecognized payload");

    let sub = app.context.subscription_repo.find_by_provider_id("sub_live1").await?.unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Pending);
    Ok(())
}
