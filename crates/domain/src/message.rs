//! 聊天消息与数据通道负载
//!
//! `ChatMessage` 是本地消息日志中的条目，追加后不可变；
//! `ChatPayload` 是通过实时传输的数据通道发送的 JSON 格式。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{MessageId, Timestamp};

/// 系统消息的发送者名称
pub const SYSTEM_SENDER: &str = "System";

/// 负载与传输层均未提供发送者时使用的名称
pub const UNKNOWN_SENDER: &str = "Unknown";

/// 消息来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    /// 本地发送（乐观回显）
    Local,
    /// 远端参与者发送
    Remote,
    /// 会话生命周期提示
    System,
}

/// 消息日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub text: String,
    pub sender: String,
    pub occurred_at: Timestamp,
    pub origin: MessageOrigin,
    /// 发送者是否为保留的助手身份，仅用于展示
    #[serde(default)]
    pub from_assistant: bool,
}

impl ChatMessage {
    pub fn local(
        id: MessageId,
        text: impl Into<String>,
        sender: impl Into<String>,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            sender: sender.into(),
            occurred_at,
            origin: MessageOrigin::Local,
            from_assistant: false,
        }
    }

    pub fn remote(
        id: MessageId,
        text: impl Into<String>,
        sender: impl Into<String>,
        occurred_at: Timestamp,
        from_assistant: bool,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            sender: sender.into(),
            occurred_at,
            origin: MessageOrigin::Remote,
            from_assistant,
        }
    }

    pub fn system(id: MessageId, text: impl Into<String>, occurred_at: Timestamp) -> Self {
        Self {
            id,
            text: text.into(),
            sender: SYSTEM_SENDER.to_string(),
            occurred_at,
            origin: MessageOrigin::System,
            from_assistant: false,
        }
    }
}

/// 数据通道上的聊天负载：`{ message, sender, timestamp }`
///
/// 解码时 `sender` 与 `timestamp` 可缺省；非 ISO-8601 字符串的时间戳
/// （例如其他生产者写入的数值）会被忽略而不是导致整条消息被丢弃。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<Timestamp>,
}

impl ChatPayload {
    pub fn new(message: impl Into<String>, sender: impl Into<String>, sent_at: Timestamp) -> Self {
        Self {
            message: message.into(),
            sender: Some(sender.into()),
            timestamp: Some(sent_at),
        }
    }

    pub fn encode(&self) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| DomainError::encode_error(err.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> DomainResult<Self> {
        serde_json::from_slice(bytes).map_err(|err| DomainError::malformed_payload(err.to_string()))
    }

    /// 负载中声明的发送者，空字符串视为缺省
    pub fn declared_sender(&self) -> Option<&str> {
        self.sender.as_deref().filter(|sender| !sender.is_empty())
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn payload_uses_wire_field_names() {
        let sent_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let payload = ChatPayload::new("hello", "alice", sent_at);
        let json: serde_json::Value = serde_json::from_slice(&payload.encode().unwrap()).unwrap();

        assert_eq!(json["message"], "hello");
        assert_eq!(json["sender"], "alice");
        assert!(json["timestamp"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
    }

    #[test]
    fn decodes_browser_iso_timestamp() {
        let payload = ChatPayload::decode(
            br#"{"message":"yo","sender":"bob","timestamp":"2024-05-01T12:00:00.000Z"}"#,
        )
        .unwrap();
        assert_eq!(payload.declared_sender(), Some("bob"));
        assert_eq!(
            payload.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn numeric_timestamp_is_ignored() {
        let payload =
            ChatPayload::decode(br#"{"message":"hi","sender":"AI Assistant","timestamp":1234.5}"#)
                .unwrap();
        assert_eq!(payload.message, "hi");
        assert!(payload.timestamp.is_none());
    }

    #[test]
    fn missing_message_is_malformed() {
        let err = ChatPayload::decode(br#"{"sender":"bob"}"#).unwrap_err();
        assert!(matches!(err, DomainError::MalformedPayload { .. }));
        assert!(ChatPayload::decode(b"not json").is_err());
    }

    #[test]
    fn empty_sender_is_treated_as_absent() {
        let payload = ChatPayload::decode(br#"{"message":"hi","sender":""}"#).unwrap();
        assert_eq!(payload.declared_sender(), None);
    }
}
