//! 实时聊天会话控制器
//!
//! 控制器拥有一个实时会话的完整生命周期以及本地物化的会话状态：
//! 有序消息日志、远端成员集合、连接状态和发送中标志。
//!
//! 所有方法都以 `&mut self` 执行，传输事件与用户操作在同一个执行上下文中
//! 逐个处理，因此不需要锁。唯一显式的并发保护是发送中标志：在上一次
//! 发布完成前，新的发送请求会被直接丢弃（不排队）。

use std::sync::Arc;

use config::ChatConfig;
use domain::{
    ChatMessage, ChatPayload, Identity, Membership, MessageId, MessageOrigin, RoomName,
    RosterSummary, Session, SessionStatus, Theme, UNKNOWN_SENDER,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::transport::{
    PublishOptions, RealtimeTransport, TransportConnection, TransportError, TransportEvent,
};

/// 会话选项
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// 保留的助手身份：其加入/离开不产生系统消息，其消息带 `from_assistant` 标记
    pub assistant_identity: Identity,
    pub theme: Theme,
    /// 连接成功后追加欢迎消息
    pub announce_session: bool,
}

impl ControllerOptions {
    pub fn from_config(chat: &ChatConfig) -> Result<Self, ApplicationError> {
        Ok(Self {
            assistant_identity: Identity::parse(chat.assistant_identity.as_str())?,
            theme: chat.theme,
            announce_session: chat.announce_session,
        })
    }
}

/// 一次加入请求：端点、凭证、身份与房间，四项均不能为空
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub endpoint: String,
    pub credential: String,
    pub identity: String,
    pub room: String,
}

/// 已进入 `Connecting`、等待传输层握手的连接尝试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnect {
    pub attempt: u64,
    pub endpoint: String,
    pub credential: String,
}

/// 已完成乐观追加、等待发布的消息
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPublish {
    pub message_id: MessageId,
    pub payload: Vec<u8>,
    pub options: PublishOptions,
}

/// 供展示层使用的状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub identity: Option<Identity>,
    pub room: Option<RoomName>,
    pub messages: Vec<ChatMessage>,
    pub participants: Vec<Identity>,
    pub sending: bool,
    pub assistant_typing: bool,
    pub roster: Option<RosterSummary>,
}

pub struct SessionController {
    transport: Arc<dyn RealtimeTransport>,
    clock: Arc<dyn Clock>,
    options: ControllerOptions,
    session: Option<Session>,
    membership: Membership,
    messages: Vec<ChatMessage>,
    pending_send: Option<MessageId>,
    assistant_typing: bool,
    last_id: MessageId,
    connect_attempt: u64,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        clock: Arc<dyn Clock>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            transport,
            clock,
            options,
            session: None,
            membership: Membership::new(),
            messages: Vec::new(),
            pending_send: None,
            assistant_typing: false,
            last_id: MessageId::new(0),
            connect_attempt: 0,
        }
    }

    /// 建立会话
    ///
    /// 已有会话会先被关闭。握手期间状态为 `Connecting`；握手失败时回到
    /// `Disconnected`，成员集合保持为空，不自动重试。成功时返回该连接的事件流。
    pub async fn connect(
        &mut self,
        request: ConnectRequest,
    ) -> Result<tokio::sync::mpsc::UnboundedReceiver<TransportEvent>, ApplicationError> {
        let pending = self.begin_connect(request).await?;
        let result = self
            .transport
            .connect(&pending.endpoint, &pending.credential)
            .await;
        self.complete_connect(pending.attempt, result).await
    }

    /// 连接的第一阶段：校验输入、关闭旧会话并进入 `Connecting`
    ///
    /// 返回的尝试编号用于在握手结束时识别过期结果。
    pub async fn begin_connect(
        &mut self,
        request: ConnectRequest,
    ) -> Result<PendingConnect, ApplicationError> {
        let endpoint = required("endpoint", &request.endpoint)?;
        let credential = required("credential", &request.credential)?;
        let identity = Identity::parse(request.identity)?;
        let room = RoomName::parse(request.room)?;

        if self.session.is_some() {
            self.disconnect().await;
        }

        let mut session = Session::new(identity, room, endpoint.clone(), credential.clone());
        session.status = SessionStatus::Connecting;
        info!(identity = %session.identity, room = %session.room, endpoint = %endpoint, "正在连接实时会话");
        self.session = Some(session);
        self.membership.clear();
        self.connect_attempt += 1;

        Ok(PendingConnect {
            attempt: self.connect_attempt,
            endpoint,
            credential,
        })
    }

    /// 连接的第二阶段：应用握手结果
    ///
    /// 已被断开或新连接取代的尝试返回 `SessionClosed`；若迟到的握手成功且
    /// 当前没有会话，该连接会被立即关闭。
    pub async fn complete_connect(
        &mut self,
        attempt: u64,
        result: Result<TransportConnection, TransportError>,
    ) -> Result<tokio::sync::mpsc::UnboundedReceiver<TransportEvent>, ApplicationError> {
        if attempt != self.connect_attempt || self.status() != SessionStatus::Connecting {
            debug!(attempt, "忽略过期的连接结果");
            if result.is_ok() && self.session.is_none() {
                self.transport.disconnect().await;
            }
            return Err(ApplicationError::SessionClosed);
        }

        match result {
            Ok(connection) => Ok(self.on_connected(connection)),
            Err(err) => {
                warn!(error = %err, "实时会话连接失败");
                self.reset_session();
                Err(ApplicationError::ConnectFailure(err))
            }
        }
    }

    fn on_connected(
        &mut self,
        connection: TransportConnection,
    ) -> tokio::sync::mpsc::UnboundedReceiver<TransportEvent> {
        let TransportConnection {
            participants,
            events,
        } = connection;

        let Some(session) = self.session.as_mut() else {
            return events;
        };
        session.status = SessionStatus::Connected;
        let identity = session.identity.clone();
        let room = session.room.clone();

        self.membership.reset(participants, &identity);
        info!(
            identity = %identity,
            room = %room,
            participants = self.membership.len(),
            "实时会话已连接"
        );

        if self.options.announce_session {
            let text = self.options.theme.welcome(room.as_str(), identity.as_str());
            self.push_system(text);
        }
        events
    }

    /// 发送一条消息：乐观追加后等待发布完成
    ///
    /// 空文本、未连接或已有发送在途时为无操作。
    pub async fn send_message(&mut self, text: &str) -> Result<(), ApplicationError> {
        let Some(outbound) = self.begin_send(text) else {
            return Ok(());
        };
        let message_id = outbound.message_id;
        let result = self
            .transport
            .publish(outbound.payload, outbound.options)
            .await;
        self.complete_send(message_id, result)
    }

    /// 发送的第一阶段：校验、置发送中标志、同步追加本地消息并生成负载
    pub fn begin_send(&mut self, text: &str) -> Option<OutboundPublish> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let identity = match self.session.as_ref() {
            Some(session) if session.is_connected() => session.identity.clone(),
            _ => {
                debug!("会话未连接，丢弃发送请求");
                return None;
            }
        };
        if let Some(pending) = self.pending_send {
            debug!(pending = %pending, "已有发送在途，丢弃发送请求");
            return None;
        }

        let now = self.clock.now();
        let payload = match ChatPayload::new(text, identity.as_str(), now).encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "消息负载序列化失败");
                return None;
            }
        };

        let message_id = self.next_id();
        self.messages
            .push(ChatMessage::local(message_id, text, identity.as_str(), now));
        self.pending_send = Some(message_id);
        if self.options.theme.shows_typing() {
            self.assistant_typing = true;
        }

        Some(OutboundPublish {
            message_id,
            payload,
            options: PublishOptions::reliable(),
        })
    }

    /// 发送的第二阶段：发布结束后清除发送中标志，失败时撤回乐观消息
    ///
    /// 断开或重连之后才到达的完成通知不再影响状态。
    pub fn complete_send(
        &mut self,
        message_id: MessageId,
        result: Result<(), TransportError>,
    ) -> Result<(), ApplicationError> {
        if self.pending_send != Some(message_id) {
            debug!(message_id = %message_id, "忽略过期的发布结果");
            return result.map_err(ApplicationError::PublishFailure);
        }
        self.pending_send = None;

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, message_id = %message_id, "消息发布失败，撤回本地消息");
                self.retract(message_id);
                self.assistant_typing = false;
                Err(ApplicationError::PublishFailure(err))
            }
        }
    }

    /// 处理一个传输事件；未连接时到达的事件被忽略
    pub fn handle_event(&mut self, event: TransportEvent) {
        if self.status() != SessionStatus::Connected {
            debug!(?event, "会话未连接，忽略传输事件");
            return;
        }
        match event {
            TransportEvent::DataReceived { payload, sender } => {
                self.on_data_received(&payload, sender.as_ref())
            }
            TransportEvent::ParticipantConnected(identity) => self.on_participant_joined(identity),
            TransportEvent::ParticipantDisconnected(identity) => self.on_participant_left(identity),
            TransportEvent::Disconnected { reason } => {
                info!(reason = reason.as_deref().unwrap_or("none"), "传输层断开");
                self.reset_session();
            }
        }
    }

    fn on_data_received(&mut self, bytes: &[u8], transport_sender: Option<&Identity>) {
        // 数据通道可能承载其他生产者或更新协议版本的消息，解析失败直接丢弃
        let payload = match ChatPayload::decode(bytes) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(error = %err, "丢弃无法解析的数据消息");
                return;
            }
        };

        let sender = payload
            .declared_sender()
            .map(str::to_owned)
            .or_else(|| transport_sender.map(|identity| identity.as_str().to_owned()));

        let Some(local) = self.session.as_ref().map(|s| s.identity.clone()) else {
            return;
        };
        // 自身发布的网络回显已由乐观消息表示
        if sender.as_deref() == Some(local.as_str()) {
            debug!("丢弃自身消息的回显");
            return;
        }

        let assistant = self.options.assistant_identity.as_str();
        let from_assistant = sender.as_deref() == Some(assistant)
            || transport_sender.is_some_and(|identity| identity.as_str() == assistant);
        let sender = sender.unwrap_or_else(|| UNKNOWN_SENDER.to_string());

        let id = self.next_id();
        let now = self.clock.now();
        self.messages.push(ChatMessage::remote(
            id,
            payload.message,
            sender,
            now,
            from_assistant,
        ));
        self.assistant_typing = false;
    }

    fn on_participant_joined(&mut self, identity: Identity) {
        if self.is_local(&identity) {
            return;
        }
        let announce = identity != self.options.assistant_identity;
        let text = self.options.theme.joined(identity.as_str());
        debug!(participant = %identity, "参与者加入");
        if self.membership.insert(identity) && announce {
            self.push_system(text);
        }
    }

    fn on_participant_left(&mut self, identity: Identity) {
        if self.is_local(&identity) {
            return;
        }
        debug!(participant = %identity, "参与者离开");
        if self.membership.remove(&identity) && identity != self.options.assistant_identity {
            let text = self.options.theme.left(identity.as_str());
            self.push_system(text);
        }
    }

    /// 关闭会话；已断开时为无操作。消息日志保留。
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        info!(identity = %session.identity, room = %session.room, "断开实时会话");
        self.transport.disconnect().await;
        self.reset_session();
    }

    fn reset_session(&mut self) {
        self.session = None;
        self.membership.clear();
        self.pending_send = None;
        self.assistant_typing = false;
    }

    fn retract(&mut self, message_id: MessageId) {
        if let Some(position) = self
            .messages
            .iter()
            .rposition(|m| m.id == message_id && m.origin == MessageOrigin::Local)
        {
            self.messages.remove(position);
        }
    }

    fn push_system(&mut self, text: String) {
        let id = self.next_id();
        let now = self.clock.now();
        self.messages.push(ChatMessage::system(id, text, now));
    }

    fn next_id(&mut self) -> MessageId {
        self.last_id = self.last_id.next();
        self.last_id
    }

    fn is_local(&self, identity: &Identity) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| &session.identity == identity)
    }

    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map(|session| session.status)
            .unwrap_or_default()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn participants(&self) -> &Membership {
        &self.membership
    }

    pub fn is_sending(&self) -> bool {
        self.pending_send.is_some()
    }

    pub fn assistant_typing(&self) -> bool {
        self.assistant_typing
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub fn transport(&self) -> Arc<dyn RealtimeTransport> {
        Arc::clone(&self.transport)
    }

    /// 人数概览，仅在会话存在时有意义
    pub fn roster(&self) -> Option<RosterSummary> {
        self.session
            .as_ref()
            .map(|_| self.membership.summary(&self.options.assistant_identity))
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            status: self.status(),
            identity: self.session.as_ref().map(|s| s.identity.clone()),
            room: self.session.as_ref().map(|s| s.room.clone()),
            messages: self.messages.clone(),
            participants: self.membership.to_vec(),
            sending: self.is_sending(),
            assistant_typing: self.assistant_typing,
            roster: self.roster(),
        }
    }
}

fn required(field: &str, value: &str) -> Result<String, ApplicationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApplicationError::validation(format!("{field} cannot be empty")));
    }
    Ok(value.to_owned())
}
