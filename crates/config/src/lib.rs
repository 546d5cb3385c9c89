//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - 实时通信平台的凭证与令牌有效期
//! - 聊天会话选项（助手身份、主题）
//!
//! 加载优先级：默认值 → 可选配置文件（`APP_CONFIG_FILE`）→ `APP_*` 环境变量
//! → `LIVEKIT_*` 环境变量。

use domain::Theme;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// 服务配置
    #[validate(nested)]
    pub server: ServerConfig,
    /// 实时通信平台配置
    #[validate(nested)]
    pub realtime: RealtimeConfig,
    /// 聊天会话配置
    #[validate(nested)]
    pub chat: ChatConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// 实时通信平台配置
///
/// 凭证允许缺省：缺失时服务仍可启动，但签发令牌会返回配置错误。
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct RealtimeConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub ws_url: Option<String>,
    /// 访问令牌有效期（秒）
    #[validate(range(min = 60))]
    pub token_ttl_seconds: i64,
    /// 预创建房间时的最大参与者数
    #[validate(range(min = 1))]
    pub max_participants: u32,
}

/// 完整的实时平台凭证
#[derive(Clone, PartialEq, Eq)]
pub struct RealtimeCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub ws_url: String,
}

/// 聊天会话配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChatConfig {
    /// 保留的助手身份
    #[validate(length(min = 1))]
    pub assistant_identity: String,
    #[serde(default)]
    pub theme: Theme,
    /// 连接成功后是否追加欢迎消息
    #[serde(default = "default_true")]
    pub announce_session: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                cors_origins: vec!["*".into()],
            },
            realtime: RealtimeConfig {
                api_key: None,
                api_secret: None,
                ws_url: None,
                token_ttl_seconds: 6 * 60 * 60,
                max_participants: 50,
            },
            chat: ChatConfig {
                assistant_identity: "AI-Assistant".into(),
                theme: Theme::Rich,
                announce_session: true,
            },
        }
    }
}

impl AppConfig {
    /// 组合所有配置来源
    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed("APP_").split("__"))
            .merge(platform_env())
    }

    /// 从默认来源加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let mut cfg: AppConfig = figment
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))?;
        cfg.realtime.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return a sanitized string representation (for logs)
    pub fn sanitize(&self) -> String {
        format!(
            "server={}:{} ws_url={} api_key={} api_secret={} assistant={} theme={:?}",
            self.server.host,
            self.server.port,
            self.realtime.ws_url.as_deref().unwrap_or("<unset>"),
            presence(&self.realtime.api_key),
            presence(&self.realtime.api_secret),
            self.chat.assistant_identity,
            self.chat.theme,
        )
    }
}

impl RealtimeConfig {
    /// 空白值视为未设置，地址校验只作用于实际给出的值
    fn normalize(&mut self) {
        self.api_key = non_blank(&self.api_key);
        self.api_secret = non_blank(&self.api_secret);
        self.ws_url = non_blank(&self.ws_url);
    }

    /// 三项凭证齐全且非空时返回
    pub fn credentials(&self) -> Option<RealtimeCredentials> {
        let api_key = non_blank(&self.api_key)?;
        let api_secret = non_blank(&self.api_secret)?;
        let ws_url = non_blank(&self.ws_url)?;
        Some(RealtimeCredentials {
            api_key,
            api_secret,
            ws_url,
        })
    }
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("api_key", &presence(&self.api_key))
            .field("api_secret", &presence(&self.api_secret))
            .field("ws_url", &self.ws_url)
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("max_participants", &self.max_participants)
            .finish()
    }
}

impl std::fmt::Debug for RealtimeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("ws_url", &self.ws_url)
            .finish()
    }
}

/// 平台 SDK 约定的环境变量名
fn platform_env() -> Env {
    Env::raw()
        .only(&[
            "LIVEKIT_API_KEY",
            "LIVEKIT_API_SECRET",
            "LIVEKIT_WS_URL",
            "NEXT_PUBLIC_LIVEKIT_WS_URL",
        ])
        .map(|key| {
            let name = key.as_str();
            if name.eq_ignore_ascii_case("LIVEKIT_API_KEY") {
                "realtime.api_key".into()
            } else if name.eq_ignore_ascii_case("LIVEKIT_API_SECRET") {
                "realtime.api_secret".into()
            } else {
                "realtime.ws_url".into()
            }
        })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn presence(value: &Option<String>) -> &'static str {
    if non_blank(value).is_some() {
        "[REDACTED]"
    } else {
        "<unset>"
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid_without_credentials() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.realtime.credentials().is_none());
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn platform_env_fills_realtime_credentials() {
        Jail::expect_with(|jail| {
            jail.set_env("LIVEKIT_API_KEY", "devkey");
            jail.set_env("LIVEKIT_API_SECRET", "devsecret");
            jail.set_env("LIVEKIT_WS_URL", "ws://localhost:7880");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            let credentials = config.realtime.credentials().ok_or("missing credentials")?;
            assert_eq!(credentials.api_key, "devkey");
            assert_eq!(credentials.api_secret, "devsecret");
            assert_eq!(credentials.ws_url, "ws://localhost:7880");
            Ok(())
        });
    }

    #[test]
    fn prefixed_env_overrides_nested_values() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_SERVER__PORT", "9090");
            jail.set_env("APP_CHAT__THEME", "minimal");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 9090);
            assert_eq!(config.chat.theme, Theme::Minimal);
            Ok(())
        });
    }

    #[test]
    fn config_file_is_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "chat.toml",
                r#"
                [chat]
                assistant_identity = "Helper"
                announce_session = false
                "#,
            )?;
            jail.set_env("APP_CONFIG_FILE", "chat.toml");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.chat.assistant_identity, "Helper");
            assert!(!config.chat.announce_session);
            Ok(())
        });
    }

    #[test]
    fn blank_secret_is_treated_as_missing() {
        let mut config = AppConfig::default();
        config.realtime.api_key = Some("key".into());
        config.realtime.api_secret = Some("   ".into());
        config.realtime.ws_url = Some("ws://localhost:7880".into());
        assert!(config.realtime.credentials().is_none());
    }

    #[test]
    fn empty_platform_env_loads_as_unset() {
        Jail::expect_with(|jail| {
            jail.set_env("LIVEKIT_API_KEY", "devkey");
            jail.set_env("LIVEKIT_API_SECRET", "devsecret");
            jail.set_env("LIVEKIT_WS_URL", "");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.realtime.ws_url, None);
            assert!(config.realtime.credentials().is_none());
            Ok(())
        });
    }

    #[test]
    fn malformed_ws_url_fails_validation() {
        Jail::expect_with(|jail| {
            jail.set_env("LIVEKIT_WS_URL", "not a url");
            assert!(AppConfig::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn short_token_ttl_fails_validation() {
        let mut config = AppConfig::default();
        config.realtime.token_ttl_seconds = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sanitize_hides_secrets() {
        let mut config = AppConfig::default();
        config.realtime.api_secret = Some("super-secret".into());
        let text = config.sanitize();
        assert!(!text.contains("super-secret"));
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
