//! 基础设施层实现。
//!
//! 提供访问令牌签名、房间预创建、令牌服务客户端以及进程内实时房间等适配器，
//! 实现应用层定义的接口。

pub mod access_token;
pub mod local_hub;
pub mod room_service;
pub mod token_client;

pub use access_token::{
    AccessClaims, AccessTokenError, AccessTokenSigner, AccessTokenVerifier, VideoGrant,
};
pub use local_hub::{LocalRoomHub, LocalTransport};
pub use room_service::HttpRoomProvisioner;
pub use token_client::HttpTokenClient;
