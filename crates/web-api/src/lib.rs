//! Web API 层。
//!
//! 提供 Axum 路由，将令牌请求委托给应用层的 `TokenService`。

mod error;
mod routes;
mod state;

pub use error::{ApiError, ErrorBody};
pub use routes::{cors_layer, router};
pub use state::AppState;
