use std::time::Duration;

use application::{ApplicationError, JoinTicket, TokenProvider};
use async_trait::async_trait;
use domain::{Identity, RoomName};
use serde::{Deserialize, Serialize};
use tracing::warn;

const TOKEN_PATH: &str = "/api/token";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequestBody<'a> {
    room_name: &'a str,
    username: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// 通过 HTTP 调用令牌接口的客户端
pub struct HttpTokenClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTokenClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApplicationError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                ApplicationError::configuration(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl TokenProvider for HttpTokenClient {
    async fn request_token(
        &self,
        room: &RoomName,
        username: &Identity,
    ) -> Result<JoinTicket, ApplicationError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, TOKEN_PATH))
            .json(&TokenRequestBody {
                room_name: room.as_str(),
                username: username.as_str(),
            })
            .send()
            .await
            .map_err(|e| ApplicationError::TokenRequest(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<JoinTicket>()
                .await
                .map_err(|e| ApplicationError::TokenRequest(format!("invalid response: {e}")));
        }

        // 服务端错误体为 { "error": "..." }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("token endpoint returned {status}"),
        };
        warn!(status = %status, error = %message, "令牌请求失败");
        Err(ApplicationError::TokenRequest(message))
    }
}
