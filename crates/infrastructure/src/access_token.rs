//! 实时平台访问令牌
//!
//! HS256 签名的 JWT：`iss` 为 API key，`sub`/`name` 为参与者身份，
//! `video` 声明携带房间权限。

use std::sync::Arc;

use application::{AccessGrant, ApplicationError, Clock, SystemClock, TokenIssuer};
use config::RealtimeCredentials;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 房间管理令牌的有效期（秒）
const ADMIN_TOKEN_TTL_SECONDS: i64 = 10 * 60;

/// 房间权限
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_join: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_create: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub can_publish: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub can_subscribe: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub can_publish_data: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub can_update_own_metadata: bool,
}

impl VideoGrant {
    /// 参与者在单个房间内的完整权限
    pub fn participant(room: &str) -> Self {
        Self {
            room: Some(room.to_owned()),
            room_join: true,
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
            can_update_own_metadata: true,
            ..Self::default()
        }
    }

    pub fn room_admin() -> Self {
        Self {
            room_create: true,
            ..Self::default()
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// JWT Claims 结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrant,
}

#[derive(Debug, Error)]
pub enum AccessTokenError {
    #[error("failed to sign access token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("invalid access token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// 访问令牌签名器
///
/// 凭证由调用方逐次传入。
#[derive(Clone)]
pub struct AccessTokenSigner {
    ttl_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl AccessTokenSigner {
    pub fn new(ttl_seconds: i64) -> Self {
        Self::with_clock(ttl_seconds, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl_seconds: i64, clock: Arc<dyn Clock>) -> Self {
        Self { ttl_seconds, clock }
    }

    /// 生成参与者令牌
    pub fn participant_token(
        &self,
        credentials: &RealtimeCredentials,
        grant: &AccessGrant,
    ) -> Result<String, AccessTokenError> {
        let identity = grant.identity.to_string();
        let claims = self.claims(
            credentials,
            Some(identity),
            VideoGrant::participant(grant.room.as_str()),
            self.ttl_seconds,
        );
        sign(credentials, &claims)
    }

    /// 生成房间管理令牌，用于调用房间服务
    pub fn admin_token(&self, credentials: &RealtimeCredentials) -> Result<String, AccessTokenError> {
        let claims = self.claims(
            credentials,
            None,
            VideoGrant::room_admin(),
            ADMIN_TOKEN_TTL_SECONDS,
        );
        sign(credentials, &claims)
    }

    fn claims(
        &self,
        credentials: &RealtimeCredentials,
        identity: Option<String>,
        video: VideoGrant,
        ttl_seconds: i64,
    ) -> AccessClaims {
        let now = self.clock.now().timestamp();
        AccessClaims {
            iss: credentials.api_key.clone(),
            name: identity.clone(),
            sub: identity,
            nbf: now,
            exp: now + ttl_seconds,
            video,
        }
    }
}

fn sign(credentials: &RealtimeCredentials, claims: &AccessClaims) -> Result<String, AccessTokenError> {
    let key = EncodingKey::from_secret(credentials.api_secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), claims, &key).map_err(AccessTokenError::Signing)
}

impl TokenIssuer for AccessTokenSigner {
    fn issue(
        &self,
        credentials: &RealtimeCredentials,
        grant: &AccessGrant,
    ) -> Result<String, ApplicationError> {
        self.participant_token(credentials, grant)
            .map_err(|err| ApplicationError::TokenIssue(err.to_string()))
    }
}

/// 访问令牌校验器
#[derive(Clone)]
pub struct AccessTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AccessTokenVerifier {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[api_key]);
        validation.validate_nbf = true;

        Self {
            decoding_key: DecodingKey::from_secret(api_secret.as_bytes()),
            validation,
        }
    }

    pub fn from_credentials(credentials: &RealtimeCredentials) -> Self {
        Self::new(&credentials.api_key, &credentials.api_secret)
    }

    /// 验证并解析令牌
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AccessTokenError> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(AccessTokenError::Invalid)
    }
}
