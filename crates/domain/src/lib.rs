//! 聊天会话核心领域模型
//!
//! 包含身份、房间、消息、会话与成员集合等核心类型，以及数据通道上的消息格式。

pub mod errors;
pub mod membership;
pub mod message;
pub mod session;
pub mod theme;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use membership::{Membership, RosterSummary};
pub use message::{ChatMessage, ChatPayload, MessageOrigin, SYSTEM_SENDER, UNKNOWN_SENDER};
pub use session::{Session, SessionStatus};
pub use theme::Theme;
pub use value_objects::*;
