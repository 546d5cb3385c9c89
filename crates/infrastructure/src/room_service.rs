//! 房间服务客户端：通过 Twirp 接口预创建房间

use std::sync::Arc;
use std::time::Duration;

use application::{ApplicationError, RoomProvisioner};
use async_trait::async_trait;
use config::RealtimeCredentials;
use domain::RoomName;
use serde::Serialize;
use tracing::debug;

use crate::access_token::AccessTokenSigner;

const CREATE_ROOM_PATH: &str = "/twirp/livekit.RoomService/CreateRoom";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct CreateRoomRequest<'a> {
    name: &'a str,
    max_participants: u32,
}

pub struct HttpRoomProvisioner {
    client: reqwest::Client,
    signer: Arc<AccessTokenSigner>,
}

impl HttpRoomProvisioner {
    pub fn new(signer: Arc<AccessTokenSigner>) -> Result<Self, ApplicationError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                ApplicationError::configuration(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client, signer })
    }
}

/// 将实时连接地址转换为 HTTP 地址
pub fn http_base_url(ws_url: &str) -> String {
    let url = if let Some(rest) = ws_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = ws_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        ws_url.to_owned()
    };
    url.trim_end_matches('/').to_owned()
}

#[async_trait]
impl RoomProvisioner for HttpRoomProvisioner {
    async fn ensure_room(
        &self,
        credentials: &RealtimeCredentials,
        room: &RoomName,
        max_participants: u32,
    ) -> Result<(), ApplicationError> {
        let token = self
            .signer
            .admin_token(credentials)
            .map_err(|e| ApplicationError::RoomProvisioning(e.to_string()))?;
        let url = format!("{}{}", http_base_url(&credentials.ws_url), CREATE_ROOM_PATH);

        debug!(url = %url, room = %room, "请求创建房间");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&CreateRoomRequest {
                name: room.as_str(),
                max_participants,
            })
            .send()
            .await
            .map_err(|e| ApplicationError::RoomProvisioning(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApplicationError::RoomProvisioning(format!(
            "room service returned {status}: {body}"
        )))
    }
}
