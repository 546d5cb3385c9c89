//! 令牌签发服务单元测试

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use config::{AppConfig, RealtimeConfig, RealtimeCredentials};
use domain::{Identity, RoomName};

use crate::error::ApplicationError;
use crate::services::{
    AccessGrant, RoomProvisioner, TokenIssuer, TokenProvider, TokenRequest, TokenService,
    TokenServiceDependencies, MISSING_FIELDS_MESSAGE,
};

#[derive(Default)]
struct RecordingIssuer {
    grants: Mutex<Vec<AccessGrant>>,
}

impl TokenIssuer for RecordingIssuer {
    fn issue(
        &self,
        credentials: &RealtimeCredentials,
        grant: &AccessGrant,
    ) -> Result<String, ApplicationError> {
        self.grants.lock().unwrap().push(grant.clone());
        Ok(format!("{}:{}:{}", credentials.api_key, grant.room, grant.identity))
    }
}

struct FailingIssuer;

impl TokenIssuer for FailingIssuer {
    fn issue(
        &self,
        _credentials: &RealtimeCredentials,
        _grant: &AccessGrant,
    ) -> Result<String, ApplicationError> {
        Err(ApplicationError::TokenIssue("signing failed".into()))
    }
}

/// 模拟房间预创建，可配置为失败
struct StubProvisioner {
    fail: bool,
    calls: AtomicUsize,
}

impl StubProvisioner {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RoomProvisioner for StubProvisioner {
    async fn ensure_room(
        &self,
        _credentials: &RealtimeCredentials,
        _room: &RoomName,
        max_participants: u32,
    ) -> Result<(), ApplicationError> {
        assert_eq!(max_participants, 50);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ApplicationError::RoomProvisioning("room already exists".into()))
        } else {
            Ok(())
        }
    }
}

fn configured() -> RealtimeConfig {
    let mut realtime = AppConfig::default().realtime;
    realtime.api_key = Some("devkey".into());
    realtime.api_secret = Some("devsecret".into());
    realtime.ws_url = Some("ws://localhost:7880".into());
    realtime
}

fn service(
    issuer: Arc<dyn TokenIssuer>,
    provisioner: Arc<dyn RoomProvisioner>,
    realtime: RealtimeConfig,
) -> TokenService {
    TokenService::new(TokenServiceDependencies {
        issuer,
        provisioner,
        realtime,
    })
}

fn request(room: Option<&str>, username: Option<&str>) -> TokenRequest {
    TokenRequest {
        room_name: room.map(str::to_owned),
        username: username.map(str::to_owned),
    }
}

#[tokio::test]
async fn issues_ticket_for_room_and_user() {
    let issuer = Arc::new(RecordingIssuer::default());
    let provisioner = Arc::new(StubProvisioner::new(false));
    let service = service(issuer.clone(), provisioner.clone(), configured());

    let ticket = service
        .issue(request(Some("lobby"), Some("alice")))
        .await
        .unwrap();

    assert_eq!(ticket.token, "devkey:lobby:alice");
    assert_eq!(ticket.ws_url, "ws://localhost:7880");
    assert_eq!(ticket.room_name, "lobby");
    assert_eq!(ticket.username, "alice");
    assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        issuer.grants.lock().unwrap().as_slice(),
        &[AccessGrant {
            identity: Identity::parse("alice").unwrap(),
            room: RoomName::parse("lobby").unwrap(),
        }]
    );
}

#[tokio::test]
async fn missing_fields_are_rejected_before_configuration_check() {
    let service = service(
        Arc::new(RecordingIssuer::default()),
        Arc::new(StubProvisioner::new(false)),
        AppConfig::default().realtime,
    );

    for req in [
        request(None, Some("alice")),
        request(Some("lobby"), None),
        request(Some("  "), Some("alice")),
        TokenRequest::default(),
    ] {
        match service.issue(req).await {
            Err(ApplicationError::Validation(message)) => {
                assert_eq!(message, MISSING_FIELDS_MESSAGE)
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn missing_credentials_is_a_configuration_error() {
    let mut realtime = configured();
    realtime.ws_url = None;
    let provisioner = Arc::new(StubProvisioner::new(false));
    let service = service(Arc::new(RecordingIssuer::default()), provisioner.clone(), realtime);

    let err = service
        .issue(request(Some("lobby"), Some("alice")))
        .await
        .unwrap_err();

    assert!(matches!(err, ApplicationError::Configuration(_)));
    assert_eq!(provisioner.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provisioning_failure_does_not_block_issuing() {
    let service = service(
        Arc::new(RecordingIssuer::default()),
        Arc::new(StubProvisioner::new(true)),
        configured(),
    );

    let ticket = service.issue(request(Some("lobby"), Some("bob"))).await;

    assert!(ticket.is_ok());
}

#[tokio::test]
async fn signing_failure_is_surfaced() {
    let service = service(
        Arc::new(FailingIssuer),
        Arc::new(StubProvisioner::new(false)),
        configured(),
    );

    let err = service
        .issue(request(Some("lobby"), Some("bob")))
        .await
        .unwrap_err();

    assert!(matches!(err, ApplicationError::TokenIssue(_)));
}

#[tokio::test]
async fn token_service_acts_as_in_process_provider() {
    let service = service(
        Arc::new(RecordingIssuer::default()),
        Arc::new(StubProvisioner::new(false)),
        configured(),
    );

    let ticket = service
        .request_token(
            &RoomName::parse("lobby").unwrap(),
            &Identity::parse("carol").unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(ticket.username, "carol");
}
