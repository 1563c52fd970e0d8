use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use social_backend::client::{ApiClient, ApiClientError, RetryPolicy};
use social_backend::{app, ApiResponse, AppState, Config, Services};

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        jitter: false,
    }
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_app(cors_origins: Option<&str>) -> String {
    let cors_origins = cors_origins.map(str::to_string);
    let config = Config::from_lookup(move |name| match name {
        "JWT_SECRET" => Some("client-test-secret".to_string()),
        "BCRYPT_COST" => Some("4".to_string()),
        "CORS_ALLOWED_ORIGINS" => cors_origins.clone(),
        _ => None,
    })
    .unwrap();

    spawn(app(AppState::new(config, Services::in_memory()))).await
}

/// Serves `/flaky`, which answers 503 for the first `failures` calls.
async fn spawn_flaky(failures: usize) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let router = Router::new().route(
        "/flaky",
        get(move || {
            let counter = counter.clone();
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                if call < failures {
                    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "try again later" }))).into_response()
                } else {
                    Json(ApiResponse::success(json!({ "ok": true }))).into_response()
                }
            }
        }),
    );

    (spawn(router).await, calls)
}

async fn register(client: &ApiClient, username: &str) -> String {
    let data: Value = client
        .post(
            "/api/auth/register",
            &json!({
                "email": format!("{}@example.com", username),
                "password": "Sup3r$ecret",
                "username": username
            }),
        )
        .await
        .unwrap();
    data["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_retries_transient_failures() {
    let (base_url, calls) = spawn_flaky(2).await;
    let client = ApiClient::new(base_url).with_retry(fast_retry(3));

    let data: Value = client.get("/flaky").await.unwrap();

    assert_eq!(data["ok"], true);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let (base_url, calls) = spawn_flaky(usize::MAX).await;
    let client = ApiClient::new(base_url).with_retry(fast_retry(2));

    let err = client.get::<Value>("/flaky").await.unwrap_err();

    assert!(matches!(
        err,
        ApiClientError::Server { status: 503, ref message } if message == "try again later"
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let base_url = spawn_app(None).await;
    let client = ApiClient::new(&base_url).with_retry(fast_retry(3));
    let token = register(&client, "alice").await;
    let client = client.with_token(token);

    let err = client
        .post::<_, Value>("/api/posts", &json!({ "content": "" }))
        .await
        .unwrap_err();
    match err {
        ApiClientError::Validation { message, details } => {
            assert_eq!(message, "Validation failed");
            assert_eq!(details.unwrap()[0]["field"], "content");
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let post: Value = client
        .post("/api/posts", &json!({ "content": "first post" }))
        .await
        .unwrap();
    assert_eq!(post["content"], "first post");

    let path = format!("/api/posts/{}", uuid::Uuid::new_v4());
    assert!(matches!(
        client.put::<_, Value>(&path, &json!({ "content": "edit" })).await,
        Err(ApiClientError::NotFound)
    ));

    let anonymous = ApiClient::new(&base_url);
    assert!(matches!(
        anonymous.get::<Value>("/api/feed").await,
        Err(ApiClientError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_connection_refused_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ApiClient::new(format!("http://{}", addr)).with_retry(fast_retry(2));
    let err = client.get::<Value>("/health").await.unwrap_err();

    assert!(matches!(err, ApiClientError::Network(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_disallowed_origin_is_reported_as_cors() {
    let base_url = spawn_app(Some("https://app.example.com")).await;

    let allowed = ApiClient::new(&base_url).with_origin("https://app.example.com");
    let token = register(&allowed, "bob").await;
    let me: Value = allowed.clone().with_token(token.clone()).get("/api/auth/me").await.unwrap();
    assert_eq!(me["email"], "bob@example.com");

    let blocked = ApiClient::new(&base_url)
        .with_origin("https://evil.example")
        .with_token(token);
    match blocked.get::<Value>("/api/auth/me").await {
        Err(ApiClientError::Cors { origin }) => assert_eq!(origin, "https://evil.example"),
        other => panic!("expected CORS error, got {:?}", other),
    }

    // a server without any CORS layer never allows a cross-origin caller
    let (flaky_url, calls) = spawn_flaky(0).await;
    let client = ApiClient::new(flaky_url)
        .with_origin("https://app.example.com")
        .with_retry(fast_retry(3));
    let err = client.get::<Value>("/flaky").await.unwrap_err();
    assert!(matches!(err, ApiClientError::Cors { .. }));
    assert!(!err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
