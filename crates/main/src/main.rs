//! 主应用程序入口
//!
//! 启动令牌签发 Web API 服务。

use std::sync::Arc;

use application::{TokenService, TokenServiceDependencies};
use config::AppConfig;
use infrastructure::{AccessTokenSigner, HttpRoomProvisioner};
use tracing_subscriber::EnvFilter;
use web_api::{cors_layer, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    tracing::info!("加载配置: {}", config.sanitize());
    if config.realtime.credentials().is_none() {
        tracing::warn!("实时平台凭证未配置，令牌请求将返回服务器配置错误");
    }

    // 签名器同时用于参与者令牌与房间管理令牌
    let signer = Arc::new(AccessTokenSigner::new(config.realtime.token_ttl_seconds));
    let provisioner = Arc::new(HttpRoomProvisioner::new(signer.clone())?);

    let token_service = TokenService::new(TokenServiceDependencies {
        issuer: signer,
        provisioner,
        realtime: config.realtime.clone(),
    });

    let app = router(AppState::new(Arc::new(token_service))).layer(cors_layer(&config.server));
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("令牌服务启动在 http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}
