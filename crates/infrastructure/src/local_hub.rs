//! 进程内实时房间
//!
//! `LocalRoomHub` 按房间维护成员及其事件通道：校验访问令牌后接纳成员，
//! 向其他成员广播加入/离开事件与数据包。`LocalTransport` 在其上实现
//! [`RealtimeTransport`]，用于本地演示与集成测试。

use std::collections::HashMap;
use std::sync::Arc;

use application::{
    PublishOptions, RealtimeTransport, TransportConnection, TransportError, TransportEvent,
};
use async_trait::async_trait;
use domain::{Identity, RoomName};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access_token::AccessTokenVerifier;

struct Member {
    identity: Identity,
    events: mpsc::UnboundedSender<TransportEvent>,
}

/// 已接纳的连接
struct Admission {
    room: RoomName,
    member_id: Uuid,
    connection: TransportConnection,
}

pub struct LocalRoomHub {
    verifier: AccessTokenVerifier,
    echo_to_sender: bool,
    rooms: RwLock<HashMap<RoomName, HashMap<Uuid, Member>>>,
}

impl LocalRoomHub {
    pub fn new(verifier: AccessTokenVerifier) -> Self {
        Self {
            verifier,
            echo_to_sender: false,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// 数据包同时回送给发送者
    pub fn with_echo(mut self, echo_to_sender: bool) -> Self {
        self.echo_to_sender = echo_to_sender;
        self
    }

    /// 房间内当前成员
    pub async fn participants(&self, room: &RoomName) -> Vec<Identity> {
        let rooms = self.rooms.read().await;
        let mut identities: Vec<Identity> = rooms
            .get(room)
            .map(|members| members.values().map(|m| m.identity.clone()).collect())
            .unwrap_or_default();
        identities.sort();
        identities.dedup();
        identities
    }

    /// 关闭房间，所有成员收到断开事件
    pub async fn close_room(&self, room: &RoomName, reason: &str) {
        let members = self.rooms.write().await.remove(room);
        for member in members.into_iter().flat_map(|m| m.into_values()) {
            let _ = member.events.send(TransportEvent::Disconnected {
                reason: Some(reason.to_owned()),
            });
        }
        info!(room = %room, reason, "房间已关闭");
    }

    async fn admit(&self, credential: &str) -> Result<Admission, TransportError> {
        let claims = self
            .verifier
            .verify(credential)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        if !claims.video.room_join {
            return Err(TransportError::Rejected("token does not grant room join".into()));
        }
        let room = claims
            .video
            .room
            .as_deref()
            .and_then(|room| RoomName::parse(room).ok())
            .ok_or_else(|| TransportError::Rejected("token has no room".into()))?;
        let identity = claims
            .sub
            .as_deref()
            .and_then(|sub| Identity::parse(sub).ok())
            .ok_or_else(|| TransportError::Rejected("token has no identity".into()))?;

        let (events_tx, events) = mpsc::unbounded_channel();
        let member_id = Uuid::new_v4();

        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.clone()).or_default();
        let mut participants = Vec::new();
        let already_present = members.values().any(|other| other.identity == identity);
        for other in members.values() {
            if other.identity != identity && !participants.contains(&other.identity) {
                participants.push(other.identity.clone());
            }
            // 同一身份的额外连接不改变房间成员
            if !already_present {
                let _ = other
                    .events
                    .send(TransportEvent::ParticipantConnected(identity.clone()));
            }
        }
        members.insert(
            member_id,
            Member {
                identity: identity.clone(),
                events: events_tx,
            },
        );
        info!(room = %room, identity = %identity, member_id = %member_id, "成员加入房间");

        Ok(Admission {
            room,
            member_id,
            connection: TransportConnection {
                participants,
                events,
            },
        })
    }

    async fn broadcast(
        &self,
        room: &RoomName,
        member_id: Uuid,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let rooms = self.rooms.read().await;
        let members = rooms.get(room).ok_or(TransportError::NotConnected)?;
        let sender = members
            .get(&member_id)
            .ok_or(TransportError::NotConnected)?
            .identity
            .clone();

        for (id, member) in members {
            if *id == member_id && !self.echo_to_sender {
                continue;
            }
            let _ = member.events.send(TransportEvent::DataReceived {
                payload: payload.clone(),
                sender: Some(sender.clone()),
            });
        }
        debug!(room = %room, sender = %sender, bytes = payload.len(), "数据包已广播");
        Ok(())
    }

    async fn leave(&self, room: &RoomName, member_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            return;
        };
        let Some(left) = members.remove(&member_id) else {
            return;
        };
        let still_present = members
            .values()
            .any(|member| member.identity == left.identity);
        if !still_present {
            for member in members.values() {
                let _ = member
                    .events
                    .send(TransportEvent::ParticipantDisconnected(left.identity.clone()));
            }
        }
        if members.is_empty() {
            rooms.remove(room);
        }
        info!(room = %room, identity = %left.identity, "成员离开房间");
    }
}

/// 基于 [`LocalRoomHub`] 的实时传输，每个实例对应一个连接
pub struct LocalTransport {
    hub: Arc<LocalRoomHub>,
    active: Mutex<Option<(RoomName, Uuid)>>,
}

impl LocalTransport {
    pub fn new(hub: Arc<LocalRoomHub>) -> Self {
        Self {
            hub,
            active: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RealtimeTransport for LocalTransport {
    async fn connect(
        &self,
        endpoint: &str,
        credential: &str,
    ) -> Result<TransportConnection, TransportError> {
        let mut active = self.active.lock().await;
        if let Some((room, member_id)) = active.take() {
            warn!(room = %room, "已有连接，先离开原房间");
            self.hub.leave(&room, member_id).await;
        }

        debug!(endpoint, "连接本地房间");
        let admission = self.hub.admit(credential).await?;
        *active = Some((admission.room, admission.member_id));
        Ok(admission.connection)
    }

    async fn publish(
        &self,
        payload: Vec<u8>,
        _options: PublishOptions,
    ) -> Result<(), TransportError> {
        let active = self.active.lock().await.clone();
        let (room, member_id) = active.ok_or(TransportError::NotConnected)?;
        self.hub.broadcast(&room, member_id, payload).await
    }

    async fn disconnect(&self) {
        let active = self.active.lock().await.take();
        if let Some((room, member_id)) = active {
            self.hub.leave(&room, member_id).await;
        }
    }
}
