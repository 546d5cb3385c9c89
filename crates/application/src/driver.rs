//! 会话事件循环
//!
//! `SessionDriver` 在单个 tokio 任务中独占 [`SessionController`]，把用户命令、
//! 当前连接的传输事件、握手结果和发布完成通知串行化处理。握手与发布都在
//! 独立任务中执行：发布在途时到达的发送命令会按控制器规则被丢弃，握手期间
//! 到达的断开命令会取消该次握手。
//!
//! 命令的应答总在新状态发布之后发出，调用方返回时 `view()` 已反映结果。

use std::collections::HashMap;

use domain::MessageId;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::controller::{ConnectRequest, SessionController, SessionView};
use crate::error::ApplicationError;
use crate::transport::{TransportConnection, TransportError, TransportEvent};

/// 发送命令的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 已发布到传输层
    Published,
    /// 空文本、未连接或已有发送在途，未做任何处理
    Dropped,
}

enum SessionCommand {
    Connect {
        request: ConnectRequest,
        reply: oneshot::Sender<Result<(), ApplicationError>>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<SendOutcome, ApplicationError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

struct PublishCompletion {
    message_id: MessageId,
    result: Result<(), TransportError>,
}

struct ConnectCompletion {
    attempt: u64,
    result: Result<TransportConnection, TransportError>,
}

/// 正在握手的连接尝试
struct InFlightConnect {
    attempt: u64,
    reply: oneshot::Sender<Result<(), ApplicationError>>,
    task: JoinHandle<()>,
}

/// 会话句柄，可克隆；所有克隆都驱动同一个会话
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub async fn connect(&self, request: ConnectRequest) -> Result<(), ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.dispatch(SessionCommand::Connect { request, reply })
            .await?;
        response.await.map_err(|_| ApplicationError::SessionClosed)?
    }

    /// 发送消息，发布完成后返回
    pub async fn send_message(
        &self,
        text: impl Into<String>,
    ) -> Result<SendOutcome, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.dispatch(SessionCommand::Send {
            text: text.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| ApplicationError::SessionClosed)?
    }

    pub async fn disconnect(&self) -> Result<(), ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.dispatch(SessionCommand::Disconnect { reply }).await?;
        response.await.map_err(|_| ApplicationError::SessionClosed)
    }

    /// 当前状态快照
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    async fn dispatch(&self, command: SessionCommand) -> Result<(), ApplicationError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ApplicationError::SessionClosed)
    }
}

pub struct SessionDriver {
    controller: SessionController,
    commands: mpsc::Receiver<SessionCommand>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    completions_tx: mpsc::UnboundedSender<PublishCompletion>,
    completions: mpsc::UnboundedReceiver<PublishCompletion>,
    connects_tx: mpsc::UnboundedSender<ConnectCompletion>,
    connects: mpsc::UnboundedReceiver<ConnectCompletion>,
    pending_connect: Option<InFlightConnect>,
    send_replies: HashMap<MessageId, oneshot::Sender<Result<SendOutcome, ApplicationError>>>,
    view: watch::Sender<SessionView>,
}

impl SessionDriver {
    /// 启动事件循环；所有句柄被丢弃后会话自动断开
    pub fn spawn(controller: SessionController) -> SessionHandle {
        let (commands_tx, commands) = mpsc::channel(32);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (connects_tx, connects) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(controller.view());

        let driver = SessionDriver {
            controller,
            commands,
            events: None,
            completions_tx,
            completions,
            connects_tx,
            connects,
            pending_connect: None,
            send_replies: HashMap::new(),
            view: view_tx,
        };
        tokio::spawn(driver.run());

        SessionHandle {
            commands: commands_tx,
            view: view_rx,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.controller.handle_event(event),
                    None => {
                        // 事件流结束等同于传输层断开
                        self.events = None;
                        self.controller.handle_event(TransportEvent::Disconnected {
                            reason: Some("event stream closed".into()),
                        });
                    }
                },
                Some(done) = self.completions.recv() => self.handle_completion(done),
                Some(done) = self.connects.recv() => self.handle_connected(done).await,
            }
            self.publish_view();
        }

        self.controller.disconnect().await;
        self.publish_view();
        self.cancel_pending_connect();
        info!("会话事件循环结束");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { request, reply } => {
                let pending = match self.controller.begin_connect(request).await {
                    Ok(pending) => pending,
                    Err(err) => {
                        let _ = reply.send(Err(err));
                        return;
                    }
                };
                self.events = None;
                self.publish_view();
                self.cancel_pending_connect();
                self.drop_pending_replies();

                let attempt = pending.attempt;
                let transport = self.controller.transport();
                let connects = self.connects_tx.clone();
                let task = tokio::spawn(async move {
                    let result = transport
                        .connect(&pending.endpoint, &pending.credential)
                        .await;
                    let _ = connects.send(ConnectCompletion { attempt, result });
                });
                self.pending_connect = Some(InFlightConnect {
                    attempt,
                    reply,
                    task,
                });
            }
            SessionCommand::Send { text, reply } => {
                let Some(outbound) = self.controller.begin_send(&text) else {
                    let _ = reply.send(Ok(SendOutcome::Dropped));
                    return;
                };
                // 乐观消息立即对订阅者可见
                self.publish_view();

                let message_id = outbound.message_id;
                self.send_replies.insert(message_id, reply);
                let transport = self.controller.transport();
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = transport.publish(outbound.payload, outbound.options).await;
                    let _ = completions.send(PublishCompletion { message_id, result });
                });
            }
            SessionCommand::Disconnect { reply } => {
                self.controller.disconnect().await;
                self.events = None;
                self.publish_view();
                self.cancel_pending_connect();
                self.drop_pending_replies();
                let _ = reply.send(());
            }
        }
    }

    async fn handle_connected(&mut self, done: ConnectCompletion) {
        let result = self
            .controller
            .complete_connect(done.attempt, done.result)
            .await
            .map(|events| {
                self.events = Some(events);
            });
        self.publish_view();

        match self.pending_connect.take() {
            Some(pending) if pending.attempt == done.attempt => {
                let _ = pending.reply.send(result);
            }
            other => {
                self.pending_connect = other;
                debug!(attempt = done.attempt, "握手完成时连接尝试已被取消");
            }
        }
    }

    fn handle_completion(&mut self, done: PublishCompletion) {
        let result = self.controller.complete_send(done.message_id, done.result);
        self.publish_view();
        match self.send_replies.remove(&done.message_id) {
            Some(reply) => {
                let _ = reply.send(result.map(|()| SendOutcome::Published));
            }
            None => debug!(message_id = %done.message_id, "发布完成时调用方已不在等待"),
        }
    }

    /// 中止在途握手，其调用方收到 `SessionClosed`
    fn cancel_pending_connect(&mut self) {
        if let Some(pending) = self.pending_connect.take() {
            pending.task.abort();
            let _ = pending.reply.send(Err(ApplicationError::SessionClosed));
        }
    }

    fn drop_pending_replies(&mut self) {
        for (_, reply) in self.send_replies.drain() {
            let _ = reply.send(Err(ApplicationError::SessionClosed));
        }
    }

    fn publish_view(&self) {
        self.view.send_replace(self.controller.view());
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
