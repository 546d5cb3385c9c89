//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例：实时会话控制器、单上下文事件循环、
//! 令牌签发与加入流程，以及对外部适配器（实时传输、令牌签名、房间预创建）的抽象。

pub mod clock;
pub mod controller;
pub mod driver;
pub mod error;
pub mod services;
pub mod transport;


pub use clock::{Clock, SystemClock};
pub use controller::{
    ConnectRequest, ControllerOptions, OutboundPublish, PendingConnect, SessionController,
    SessionView,
};
pub use driver::{SendOutcome, SessionDriver, SessionHandle};
pub use error::ApplicationError;
pub use services::{
    AccessGrant, JoinService, JoinTicket, RoomProvisioner, TokenIssuer, TokenProvider,
    TokenRequest, TokenService, TokenServiceDependencies, MISSING_FIELDS_MESSAGE,
};
pub use transport::{
    PublishOptions, RealtimeTransport, TransportConnection, TransportError, TransportEvent,
};
