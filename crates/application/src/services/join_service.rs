use std::sync::Arc;

use async_trait::async_trait;
use domain::{Identity, RoomName};
use tracing::info;

use crate::controller::ConnectRequest;
use crate::driver::SessionHandle;
use crate::error::ApplicationError;
use crate::services::token_service::{JoinTicket, TokenRequest, TokenService};

/// 加入流程使用的令牌来源
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn request_token(
        &self,
        room: &RoomName,
        username: &Identity,
    ) -> Result<JoinTicket, ApplicationError>;
}

/// 进程内直接签发
#[async_trait]
impl TokenProvider for TokenService {
    async fn request_token(
        &self,
        room: &RoomName,
        username: &Identity,
    ) -> Result<JoinTicket, ApplicationError> {
        self.issue(TokenRequest {
            room_name: Some(room.to_string()),
            username: Some(username.to_string()),
        })
        .await
    }
}

impl From<&JoinTicket> for ConnectRequest {
    fn from(ticket: &JoinTicket) -> Self {
        ConnectRequest {
            endpoint: ticket.ws_url.clone(),
            credential: ticket.token.clone(),
            identity: ticket.username.clone(),
            room: ticket.room_name.clone(),
        }
    }
}

/// 加入流程：校验输入 → 获取令牌 → 建立会话
pub struct JoinService {
    provider: Arc<dyn TokenProvider>,
    session: SessionHandle,
}

impl JoinService {
    pub fn new(provider: Arc<dyn TokenProvider>, session: SessionHandle) -> Self {
        Self { provider, session }
    }

    pub async fn join(&self, room: &str, username: &str) -> Result<JoinTicket, ApplicationError> {
        let room = RoomName::parse(room)?;
        let username = Identity::parse(username)?;

        let ticket = self.provider.request_token(&room, &username).await?;
        self.session.connect(ConnectRequest::from(&ticket)).await?;
        info!(room = %room, username = %username, "已加入房间");
        Ok(ticket)
    }

    pub async fn leave(&self) -> Result<(), ApplicationError> {
        self.session.disconnect().await
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}
