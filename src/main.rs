use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use sports_api_gate::{
    database::Database,
    errors::AuthError,
    gate::AuthGate,
    models::{CreateApiKeyRequest, CreateApiKeyResponse, SportScope},
    rate_limit::RateLimiter,
    security::KeyStore,
    usage::UsageRecorder,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct AppState {
    gate: AuthGate,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "db/sports_api.db".to_string());
    let db = Database::new(&db_path).expect("Failed to initialize database");

    let keys = KeyStore::new(db.clone());
    let limiter = RateLimiter::new();
    let usage = UsageRecorder::spawn(db);
    let gate = AuthGate::new(keys, limiter, usage);

    // Reclaim counters for keys that went quiet; active keys are evicted
    // lazily on their next check.
    let sweeper = gate.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(120));
        loop {
            interval.tick().await;
            sweeper.sweep(Utc::now());
        }
    });

    let state = Arc::new(AppState { gate });

    let app = Router::new()
        .route("/api-keys", post(create_api_key).get(list_api_keys))
        .route("/api-keys/:id/revoke", post(revoke_api_key))
        .route("/matches/:sport", get(get_matches))
        .with_state(state);

    let addr: std::net::SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .expect("Invalid BIND_ADDR");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateApiKeyRequest>,
) -> Result<Json<CreateApiKeyResponse>, Response> {
    let sports = SportScope::from_tags(&payload.sports).map_err(error_response)?;
    let rate_limit = payload.rate_limit_per_minute.unwrap_or(100);

    let (generated, record) = state
        .gate
        .keys
        .create(&payload.name, sports, rate_limit, payload.expires_at)
        .map_err(error_response)?;

    tracing::info!(key_id = record.id, key_prefix = %record.key_prefix, "API key created");

    Ok(Json(CreateApiKeyResponse {
        api_key: generated.plain,
        key_prefix: record.key_prefix,
        name: record.name,
        sports: record.sports.as_list(),
        rate_limit_per_minute: record.rate_limit_per_minute,
    }))
}

async fn list_api_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, Response> {
    let keys = state.gate.keys.list().map_err(error_response)?;
    Ok(Json(json!({ "success": true, "keys": keys })))
}

async fn revoke_api_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, Response> {
    state.gate.keys.revoke(id).map_err(error_response)?;
    tracing::info!(key_id = id, "API key revoked");
    Ok(Json(json!({ "success": true, "message": "API key revoked" })))
}

/// Gated entry to the match data routes. The data handlers themselves are
/// served by the sync side; this route reports the admission decision.
async fn get_matches(
    State(state): State<Arc<AppState>>,
    Path(sport): Path<String>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    let credential = extract_api_key(&headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "error": "Missing API key. Use 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header."
            })),
        )
            .into_response()
    })?;

    let admission = state
        .gate
        .authorize(credential, &sport)
        .map_err(error_response)?;

    Ok((
        [
            (
                "X-RateLimit-Limit",
                admission.rate_limit_per_minute.to_string(),
            ),
            ("X-RateLimit-Remaining", admission.remaining.to_string()),
        ],
        Json(json!({
            "success": true,
            "sport": sport,
            "key_id": admission.key_id,
        })),
    )
        .into_response())
}

/// "Authorization: Bearer sk_live_..." first, "X-API-Key" as fallback.
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(auth) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth) = auth.to_str() {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                return Some(token);
            }
        }
    }
    headers.get("X-API-Key").and_then(|v| v.to_str().ok())
}

fn error_response(err: AuthError) -> Response {
    let status = match &err {
        AuthError::NotFound | AuthError::Expired | AuthError::Revoked => StatusCode::UNAUTHORIZED,
        AuthError::ScopeDenied => StatusCode::FORBIDDEN,
        AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = Json(json!({ "success": false, "error": err.to_string() }));

    if let AuthError::RateLimited { retry_after } = err {
        (
            status,
            [
                (header::RETRY_AFTER.as_str(), retry_after.to_string()),
                ("X-RateLimit-Remaining", "0".to_string()),
            ],
            body,
        )
            .into_response()
    } else {
        (status, body).into_response()
    }
}
