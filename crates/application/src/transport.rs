//! 实时传输抽象
//!
//! 外部托管的实时通信平台只通过这里的本地接口使用：连接、发布、接收事件、断开。

use async_trait::async_trait;
use domain::Identity;
use thiserror::Error;
use tokio::sync::mpsc;

/// 传输层推送给会话的事件，到达顺序即本地处理顺序
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    DataReceived {
        payload: Vec<u8>,
        sender: Option<Identity>,
    },
    ParticipantConnected(Identity),
    ParticipantDisconnected(Identity),
    Disconnected {
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// 至少一次、按发送者有序
    pub reliable: bool,
}

impl PublishOptions {
    pub fn reliable() -> Self {
        Self { reliable: true }
    }
}

/// 握手成功后的连接
#[derive(Debug)]
pub struct TransportConnection {
    /// 连接时房间内已有的远端成员
    pub participants: Vec<Identity>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("credential rejected: {0}")]
    Rejected(String),
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("not connected")]
    NotConnected,
    #[error("transport failure: {0}")]
    Failed(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        credential: &str,
    ) -> Result<TransportConnection, TransportError>;

    async fn publish(
        &self,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), TransportError>;

    async fn disconnect(&self);
}
