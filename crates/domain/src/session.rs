//! 实时会话实体

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value_objects::{Identity, RoomName};

/// 会话连接状态
///
/// 状态迁移：`Disconnected → Connecting → Connected → Disconnected`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// 一次加入房间所建立的实时会话
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    pub room: RoomName,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub credential: String,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(
        identity: Identity,
        room: RoomName,
        endpoint: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            room,
            endpoint: endpoint.into(),
            credential: credential.into(),
            status: SessionStatus::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }
}

// 凭证不进入日志
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("room", &self.room)
            .field("endpoint", &self.endpoint)
            .field("credential", &"[REDACTED]")
            .field("status", &self.status)
            .finish()
    }
}
