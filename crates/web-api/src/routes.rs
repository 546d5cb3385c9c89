use application::{JoinTicket, TokenRequest, MISSING_FIELDS_MESSAGE};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use config::ServerConfig;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::{error::ApiError, state::AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/token", post(issue_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 按配置的来源列表构建 CORS 层，`*` 表示任意来源
pub fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if server.cors_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "忽略无效的 CORS 来源");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 请求体按 JSON 解析，不要求 `Content-Type`
async fn issue_token(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<JoinTicket>, ApiError> {
    let request = parse_token_request(&body)?;
    let ticket = state.token_service.issue(request).await?;
    Ok(Json(ticket))
}

/// 非 JSON 请求体按服务器错误处理；字段类型不符等同于字段缺失
fn parse_token_request(body: &[u8]) -> Result<TokenRequest, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|err| {
        warn!(error = %err, "令牌请求体不是合法 JSON");
        ApiError::token_failure()
    })?;
    serde_json::from_value(value).map_err(|err| {
        debug!(error = %err, "令牌请求字段缺失或类型不符");
        ApiError::bad_request(MISSING_FIELDS_MESSAGE)
    })
}
