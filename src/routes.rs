use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::handlers::{self, AppState};
use crate::rate_limit::{enforce_submission_limit, general_limit_response};

const OPENAPI_SPEC: &str = include_str!("../openapi.yml");

/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 10 * 1024;

/// Serves the OpenAPI specification YAML file.
async fn serve_openapi_spec() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/yaml")],
        OPENAPI_SPEC,
    )
}

/// Serves the Swagger UI HTML page, pointed at [`serve_openapi_spec`].
async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>University Leads API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// Origins allowed to call the API from a browser: the configured frontend,
/// local dev servers and Vercel preview deployments.
pub fn is_allowed_origin(origin: &str, frontend_url: Option<&str>) -> bool {
    if frontend_url.is_some_and(|url| url.trim_end_matches('/') == origin) {
        return true;
    }
    if origin == "http://localhost:3000" || origin == "http://localhost:5000" {
        return true;
    }
    url::Url::parse(origin).is_ok_and(|url| {
        url.scheme() == "https"
            && url
                .host_str()
                .is_some_and(|host| host.ends_with(".vercel.app"))
    })
}

fn cors_layer(config: &Config) -> CorsLayer {
    let frontend_url = config.frontend_url.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request| {
                origin
                    .to_str()
                    .is_ok_and(|o| is_allowed_origin(o, frontend_url.as_deref()))
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Assembles the full application router.
pub fn build_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let submission_limit = middleware::from_fn_with_state(
        state.submission_limiter.clone(),
        enforce_submission_limit,
    );

    // Token bucket refilling the general quota evenly over its window
    let general = state.config.general_rate_limit;
    let refill_ms = (general.window.as_millis() / u128::from(general.max_requests)).max(1);
    let governor_conf = GovernorConfigBuilder::default()
        .per_millisecond(u64::try_from(refill_ms).unwrap_or(u64::MAX))
        .burst_size(general.max_requests)
        .key_extractor(SmartIpKeyExtractor)
        .error_handler(move |err| general_limit_response(err, general.window))
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid general rate limit configuration"))?;

    let lead_routes = Router::new()
        .route(
            "/api/leads",
            post(handlers::create_lead)
                .layer(submission_limit)
                .get(handlers::list_leads),
        )
        .route("/api/leads/stats", get(handlers::lead_stats))
        .route("/api/leads/check-phone", post(handlers::check_phone))
        .route(
            "/api/leads/:id",
            get(handlers::get_lead).delete(handlers::delete_lead),
        )
        .route("/api/leads/:id/status", patch(handlers::update_lead_status))
        .layer(GovernorLayer {
            config: Arc::new(governor_conf),
        });

    let app = Router::new()
        .route("/", get(handlers::welcome))
        .route("/api/health", get(handlers::health))
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(serve_openapi_spec))
        .merge(lead_routes)
        .fallback(handlers::route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config)),
        )
        .with_state(state);

    Ok(app)
}
