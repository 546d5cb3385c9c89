use std::sync::Arc;

use async_trait::async_trait;
use config::{RealtimeConfig, RealtimeCredentials};
use domain::{Identity, RoomName};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ApplicationError;

/// 房间名或用户名缺失时返回给调用方的提示
pub const MISSING_FIELDS_MESSAGE: &str = "Room name and username are required";

/// 令牌请求，字段允许缺省以便统一返回校验错误
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// 加入房间所需的全部信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTicket {
    pub token: String,
    pub ws_url: String,
    pub room_name: String,
    pub username: String,
}

/// 访问授权：身份在指定房间内加入、发布与订阅
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub identity: Identity,
    pub room: RoomName,
}

/// 访问令牌签名器
pub trait TokenIssuer: Send + Sync {
    fn issue(
        &self,
        credentials: &RealtimeCredentials,
        grant: &AccessGrant,
    ) -> Result<String, ApplicationError>;
}

/// 房间预创建
#[async_trait]
pub trait RoomProvisioner: Send + Sync {
    async fn ensure_room(
        &self,
        credentials: &RealtimeCredentials,
        room: &RoomName,
        max_participants: u32,
    ) -> Result<(), ApplicationError>;
}

pub struct TokenServiceDependencies {
    pub issuer: Arc<dyn TokenIssuer>,
    pub provisioner: Arc<dyn RoomProvisioner>,
    pub realtime: RealtimeConfig,
}

pub struct TokenService {
    deps: TokenServiceDependencies,
}

impl TokenService {
    pub fn new(deps: TokenServiceDependencies) -> Self {
        Self { deps }
    }

    /// 为 `(room, username)` 签发访问令牌
    ///
    /// 房间预创建失败（例如房间已存在）不影响签发。
    pub async fn issue(&self, request: TokenRequest) -> Result<JoinTicket, ApplicationError> {
        let (room, identity) = parse_request(&request)?;

        let credentials = self.deps.realtime.credentials().ok_or_else(|| {
            error!(
                has_api_key = self.deps.realtime.api_key.is_some(),
                has_api_secret = self.deps.realtime.api_secret.is_some(),
                has_ws_url = self.deps.realtime.ws_url.is_some(),
                "实时平台凭证未配置"
            );
            ApplicationError::configuration("realtime credentials are not configured")
        })?;

        match self
            .deps
            .provisioner
            .ensure_room(&credentials, &room, self.deps.realtime.max_participants)
            .await
        {
            Ok(()) => info!(room = %room, "房间已创建或已存在"),
            Err(err) => info!(room = %room, error = %err, "房间预创建未完成，继续签发令牌"),
        }

        let grant = AccessGrant {
            identity: identity.clone(),
            room: room.clone(),
        };
        let token = self.deps.issuer.issue(&credentials, &grant)?;
        info!(identity = %identity, room = %room, "已签发访问令牌");

        Ok(JoinTicket {
            token,
            ws_url: credentials.ws_url,
            room_name: room.to_string(),
            username: identity.to_string(),
        })
    }
}

fn parse_request(request: &TokenRequest) -> Result<(RoomName, Identity), ApplicationError> {
    let room = request
        .room_name
        .as_deref()
        .and_then(|room| RoomName::parse(room).ok());
    let identity = request
        .username
        .as_deref()
        .and_then(|name| Identity::parse(name).ok());
    match (room, identity) {
        (Some(room), Some(identity)) => Ok((room, identity)),
        _ => Err(ApplicationError::validation(MISSING_FIELDS_MESSAGE)),
    }
}
