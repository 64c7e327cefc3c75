/// Router-level tests against the in-memory store.
/// Requests go through the full middleware stack via `tower::ServiceExt::oneshot`.
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;
use university_leads_api::config::Config;
use university_leads_api::handlers::AppState;
use university_leads_api::memory_storage::MemoryLeadStore;
use university_leads_api::models::WebhookStatus;
use university_leads_api::notifier::{ReqwestTransport, WebhookNotifier};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create a memory-backed test config
fn create_test_config(vars: &[(&str, &str)]) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    map.insert("STORAGE".to_string(), "memory".to_string());
    map.insert("APP_ENV".to_string(), "test".to_string());
    for (k, v) in vars {
        map.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| map.get(key).cloned()).unwrap()
}

fn create_app(config: Config) -> (Router, Arc<AppState>) {
    let store = Arc::new(MemoryLeadStore::new(config.duplicate_phone_policy));
    let notifier = WebhookNotifier::new(
        Arc::new(ReqwestTransport::new().unwrap()),
        config.webhook_url.clone(),
    );
    let state = Arc::new(AppState::new(config, store, notifier));
    let app = university_leads_api::routes::build_router(Arc::clone(&state)).unwrap();
    (app, state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.10");
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}

fn lead_body(name: &str, phone: &str) -> Value {
    json!({
        "name": name,
        "phoneNumber": phone,
        "email": "Test@Example.com",
        "stream": "Science"
    })
}

#[tokio::test]
async fn test_valid_submission_is_acknowledged() {
    let (app, state) = create_app(create_test_config(&[]));

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("Test User", "+91 98765-43210")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Test User");
    assert_eq!(body["data"]["email"], "test@example.com");
    assert_eq!(body["data"]["stream"], "Science");
    assert!(body["data"]["submittedAt"].is_string());

    let id = body["data"]["id"].as_str().unwrap();
    let (status, _, body) = send(&app, Method::GET, &format!("/api/leads/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phoneNumber"], "9876543210");
    assert_eq!(body["data"]["formattedPhone"], "987-654-3210");
    assert_eq!(body["data"]["callStatus"], "pending");
    // No webhook URL configured: delivery is skipped and nothing is recorded
    state.submissions.drain(Duration::from_secs(5)).await;
    let (_, _, body) = send(&app, Method::GET, &format!("/api/leads/{}", id), None).await;
    assert_eq!(body["data"]["webhookStatus"], "pending");
    assert_eq!(body["data"]["webhookAttempts"], 0);
}

#[tokio::test]
async fn test_phone_number_as_json_number() {
    let (app, _) = create_app(create_test_config(&[]));
    let mut body = lead_body("Test User", "");
    body["phoneNumber"] = json!(9876543210u64);

    let (status, _, _) = send(&app, Method::POST, "/api/leads", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_invalid_phone_is_rejected() {
    let (app, _) = create_app(create_test_config(&[]));

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("Test User", "12345")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Validation failed");
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "phoneNumber");

    let (_, _, list) = send(&app, Method::GET, "/api/leads", None).await;
    assert_eq!(list["data"]["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_invalid_email_and_missing_fields() {
    let (app, _) = create_app(create_test_config(&[]));

    let mut body = lead_body("Test User", "9876543210");
    body["email"] = json!("not-an-email");
    let (status, _, body) = send(&app, Method::POST, "/api/leads", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "email");

    let (status, _, body) = send(&app, Method::POST, "/api/leads", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "phoneNumber", "email", "stream"]);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (app, _) = create_app(create_test_config(&[]));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/leads")
        .header("x-forwarded-for", "203.0.113.10")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (app, _) = create_app(create_test_config(&[]));
    let payload = json!({ "name": "a".repeat(11 * 1024) }).to_string();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/leads")
        .header("x-forwarded-for", "203.0.113.10")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, payload.len())
        .body(Body::from(payload))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_duplicate_phone_rejected_by_default() {
    let (app, _) = create_app(create_test_config(&[]));

    let (first, _, _) = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("First User", "7654321098")),
    )
    .await;
    assert_eq!(first, StatusCode::CREATED);

    let (second, _, body) = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("Second User", "076543 21098")),
    )
    .await;
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(
        body["message"],
        "This phone number is already registered. We will contact you soon!"
    );
}

#[tokio::test]
async fn test_duplicate_phone_allowed_by_policy() {
    let (app, _) = create_app(create_test_config(&[("DUPLICATE_PHONE_POLICY", "allow")]));

    for name in ["First User", "Second User"] {
        let (status, _, _) = send(
            &app,
            Method::POST,
            "/api/leads",
            Some(lead_body(name, "7654321098")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, _, list) = send(&app, Method::GET, "/api/leads", None).await;
    assert_eq!(list["data"]["pagination"]["total"], 2);
}

#[tokio::test]
async fn test_check_phone() {
    let (app, _) = create_app(create_test_config(&[]));

    let check = json!({ "phoneNumber": "98765-43210" });
    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/leads/check-phone",
        Some(check.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["exists"], false);
    assert_eq!(body["data"]["message"], "Phone number is available");

    send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("Test User", "9876543210")),
    )
    .await;

    let (_, _, body) = send(&app, Method::POST, "/api/leads/check-phone", Some(check)).await;
    assert_eq!(body["data"]["exists"], true);

    // Missing or malformed input never fails
    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/leads/check-phone",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["exists"], false);
}

#[tokio::test]
async fn test_check_phone_matches_prefixed_variants() {
    let (app, _) = create_app(create_test_config(&[]));

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("Test User", "+91 98765 43210")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    for variant in ["+91 98765 43210", "098765 43210", "919876543210"] {
        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/leads/check-phone",
            Some(json!({ "phoneNumber": variant })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["exists"], true, "variant {}", variant);
    }
}

#[tokio::test]
async fn test_list_pagination_and_filters() {
    let (app, _) = create_app(create_test_config(&[]));
    let leads = [
        ("Asha Rao", "9000000001", "Science"),
        ("Ravi Kumar", "9000000002", "Commerce"),
        ("Meera Nair", "9000000003", "Science"),
    ];
    for (name, phone, stream) in leads {
        let body = json!({
            "name": name,
            "phoneNumber": phone,
            "email": format!("{}@example.com", phone),
            "stream": stream
        });
        let (status, _, _) = send(&app, Method::POST, "/api/leads", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let (status, _, body) = send(&app, Method::GET, "/api/leads?page=1&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["leads"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["leads"][0]["name"], "Meera Nair");
    assert_eq!(
        body["data"]["pagination"],
        json!({ "current": 1, "pages": 2, "total": 3, "limit": 2 })
    );

    let (_, _, body) = send(&app, Method::GET, "/api/leads?limit=500", None).await;
    assert_eq!(body["data"]["pagination"]["limit"], 100);

    let (_, _, body) = send(&app, Method::GET, "/api/leads?stream=Science", None).await;
    assert_eq!(body["data"]["pagination"]["total"], 2);

    let (_, _, body) = send(&app, Method::GET, "/api/leads?search=ravi", None).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (status, _, _) = send(&app, Method::GET, "/api/leads?stream=Arts", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_and_status_updates() {
    let (app, _) = create_app(create_test_config(&[]));
    let (_, _, created) = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("Test User", "9876543210")),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/leads/{}/status", id),
        Some(json!({ "callStatus": "called", "callDetails": { "duration": 120 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Lead status updated successfully");
    assert_eq!(body["data"]["callStatus"], "called");
    assert_eq!(body["data"]["callDetails"]["duration"], 120);

    let (status, _, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/leads/{}/status", id),
        Some(json!({ "callStatus": "ghosted" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "callStatus");

    let (status, _, body) = send(&app, Method::GET, "/api/leads/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["overview"]["total"], 1);
    assert_eq!(body["data"]["overview"]["called"], 1);
    assert_eq!(body["data"]["overview"]["pending"], 0);
    assert_eq!(body["data"]["byStream"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_lead_lookup_errors_and_delete() {
    let (app, _) = create_app(create_test_config(&[]));

    let (status, _, _) = send(&app, Method::GET, "/api/leads/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4();
    let (status, _, body) = send(&app, Method::GET, &format!("/api/leads/{}", missing), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/leads/{}/status", missing),
        Some(json!({ "callStatus": "called" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, _, created) = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("Test User", "9876543210")),
    )
    .await;
    let uri = format!("/api/leads/{}", created["data"]["id"].as_str().unwrap());

    let (status, _, body) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Lead deleted successfully");

    let (status, _, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submission_rate_limit() {
    let (app, _) = create_app(create_test_config(&[("SUBMISSION_RATE_LIMIT", "2")]));
    let phones = ["9000000001", "9000000002", "9000000003"];

    for phone in &phones[..2] {
        let (status, _, _) = send(
            &app,
            Method::POST,
            "/api/leads",
            Some(lead_body("Test User", phone)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, headers, body) = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("Test User", phones[2])),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body["message"],
        "Too many form submissions from this IP. Please try again after an hour."
    );
    assert_eq!(body["retryAfter"], "1 hour");
    assert!(headers.contains_key(header::RETRY_AFTER));

    // Reads are not counted against the submission quota
    let (status, _, _) = send(&app, Method::GET, "/api/leads", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_general_rate_limit_uses_error_body() {
    let (app, _) = create_app(create_test_config(&[("GENERAL_RATE_LIMIT", "2")]));

    for _ in 0..2 {
        let (status, _, _) = send(&app, Method::GET, "/api/leads", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, headers, body) = send(&app, Method::GET, "/api/leads", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "Too many requests from this IP, please try again later."
    );
    assert_eq!(body["retryAfter"], "15 minutes");
    assert!(body["errors"].as_array().unwrap().is_empty());
    assert!(headers.contains_key(header::RETRY_AFTER));

    // Health checks are outside the general limiter
    let (status, _, _) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_submission_returns_before_slow_webhook() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook/lead"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let webhook_url = format!("{}/webhook/lead", mock_server.uri());
    let (app, state) = create_app(create_test_config(&[("N8N_WEBHOOK_URL", webhook_url.as_str())]));

    let start = Instant::now();
    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(lead_body("Test User", "9876543210")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(start.elapsed() < Duration::from_secs(1));

    assert!(state.submissions.drain(Duration::from_secs(30)).await);
    let id = body["data"]["id"].as_str().unwrap().parse().unwrap();
    let lead = state.store.find_by_id(id).await.unwrap();
    assert_eq!(lead.webhook_status, WebhookStatus::Sent);
    assert_eq!(lead.webhook_attempts, 1);
}

#[tokio::test]
async fn test_health_root_docs_and_fallback() {
    let (app, _) = create_app(create_test_config(&[]));

    let (status, _, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "University Lead Generation API is running");
    assert_eq!(body["environment"], "test");

    let (status, _, body) = send(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Welcome to University Lead Generation API");

    let (status, headers, _) = send(&app, Method::GET, "/api-docs/openapi.yml", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/yaml");

    let (status, _, body) = send(&app, Method::GET, "/api/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route /api/unknown not found");
}

#[tokio::test]
async fn test_cors_allows_listed_origins_only() {
    let (app, _) = create_app(create_test_config(&[(
        "FRONTEND_URL",
        "https://admissions.example.edu",
    )]));

    for (origin, allowed) in [
        ("https://admissions.example.edu", true),
        ("https://preview-123.vercel.app", true),
        ("https://evil.example.com", false),
    ] {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let allow = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string());
        if allowed {
            assert_eq!(allow.as_deref(), Some(origin));
        } else {
            assert_eq!(allow, None);
        }
    }
}
