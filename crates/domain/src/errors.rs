//! 领域模型错误定义
//!
//! 定义了领域层可能出现的错误类型，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 验证错误
    #[error("验证失败: {field}: {message}")]
    ValidationError { field: String, message: String },

    /// 数据通道负载无法解析
    #[error("消息负载格式错误: {reason}")]
    MalformedPayload { reason: String },

    /// 消息负载序列化失败
    #[error("消息负载序列化失败: {reason}")]
    EncodeError { reason: String },
}

impl DomainError {
    /// 创建验证错误
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建负载格式错误
    pub fn malformed_payload(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }

    pub fn encode_error(reason: impl Into<String>) -> Self {
        Self::EncodeError {
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
