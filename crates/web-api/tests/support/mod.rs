use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use application::{ApplicationError, RoomProvisioner, TokenService, TokenServiceDependencies};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use config::{AppConfig, RealtimeConfig, RealtimeCredentials};
use domain::RoomName;
use infrastructure::AccessTokenSigner;
use serde_json::{json, Value};
use tower::ServiceExt;
use web_api::{cors_layer, router, AppState};

pub const API_KEY: &str = "devkey";
pub const API_SECRET: &str = "devsecret";
pub const WS_URL: &str = "wss://chat.example.com";

/// 记录调用次数的房间预创建替身
#[derive(Default)]
pub struct StubProvisioner {
    pub fail: bool,
    calls: AtomicUsize,
}

impl StubProvisioner {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoomProvisioner for StubProvisioner {
    async fn ensure_room(
        &self,
        _credentials: &RealtimeCredentials,
        _room: &RoomName,
        _max_participants: u32,
    ) -> Result<(), ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ApplicationError::RoomProvisioning("room already exists".into()));
        }
        Ok(())
    }
}

pub fn configured_realtime() -> RealtimeConfig {
    let mut realtime = AppConfig::default().realtime;
    realtime.api_key = Some(API_KEY.into());
    realtime.api_secret = Some(API_SECRET.into());
    realtime.ws_url = Some(WS_URL.into());
    realtime
}

pub fn build_router(realtime: RealtimeConfig, provisioner: Arc<StubProvisioner>) -> Router {
    let token_service = TokenService::new(TokenServiceDependencies {
        issuer: Arc::new(AccessTokenSigner::new(realtime.token_ttl_seconds)),
        provisioner,
        realtime,
    });
    router(AppState::new(Arc::new(token_service))).layer(cors_layer(&AppConfig::default().server))
}

pub async fn post_token(app: &Router, body: Value) -> (StatusCode, Value) {
    post_raw(app, body.to_string()).await
}

pub async fn post_raw(app: &Router, body: String) -> (StatusCode, Value) {
    post_with_content_type(app, body, Some("application/json")).await
}

pub async fn post_with_content_type(
    app: &Router,
    body: String,
    content_type: Option<&str>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method("POST").uri("/api/token");
    if let Some(content_type) = content_type {
        request = request.header("content-type", content_type);
    }
    let request = request.body(Body::from(body)).expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));
    (status, body)
}
