//! Common test utilities for service tests
//!
//! Services run on ephemeral loopback ports so their discovery endpoints are
//! reachable by each other, the same way they are in a deployment.

#![allow(dead_code)]

use std::sync::OnceLock;

use campus_auth::{KeyStore, PemKeyPair, Role, RoleSet, generate_pem_pair};
use campus_server::config::PeersConfig;
use campus_server::{AppState, ServiceConfig, ServiceKind};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Key pair shared by every service in a test binary
pub fn pem_pair() -> &'static PemKeyPair {
    static PAIR: OnceLock<PemKeyPair> = OnceLock::new();
    PAIR.get_or_init(|| generate_pem_pair(2048).unwrap())
}

/// Key store over [`pem_pair`] with kid `kid`
pub fn keys(kid: &str) -> KeyStore {
    KeyStore::from_pem(kid, &pem_pair().private_pem, Some(&pem_pair().public_pem)).unwrap()
}

/// A service listening on loopback until dropped
pub struct RunningService {
    pub base_url: String,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl RunningService {
    /// Start `kind` with its own key and the given peers
    pub async fn start(kind: ServiceKind, peers: PeersConfig) -> Self {
        Self::start_with(kind, peers, |_| {}).await
    }

    /// Start `kind` after adjusting its configuration
    pub async fn start_with(
        kind: ServiceKind,
        peers: PeersConfig,
        adjust: impl FnOnce(&mut ServiceConfig),
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let mut config = ServiceConfig::default();
        config.service.kind = kind;
        config.service.bind = addr;
        config.service.public_base_url = base_url.clone();
        config.peers = peers;
        adjust(&mut config);

        let state = AppState::new(&config, keys(kind.as_str())).unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(campus_server::serve(listener, state.clone(), async move {
            let _ = rx.await;
        }));

        Self {
            base_url,
            state,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    /// Absolute URL of `path` on this service
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Token for `subject` signed by this service
    pub fn token(&self, subject: &str, roles: impl Into<RoleSet>) -> String {
        self.state
            .issuer()
            .issue_for(subject, roles.into())
            .unwrap()
            .token
            .into_string()
    }

    /// Administrator token signed by this service
    pub fn admin_token(&self) -> String {
        self.token("admin", Role::Admin)
    }

    /// Stop accepting connections and wait for the server to finish
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap().unwrap();
        }
    }
}

impl Drop for RunningService {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Campus deployment with every service running
pub struct Campus {
    pub auth: RunningService,
    pub student: RunningService,
    pub professor: RunningService,
    pub course: RunningService,
    pub enrollment: RunningService,
}

impl Campus {
    /// Start all five services wired to each other
    pub async fn start() -> Self {
        let student = RunningService::start(ServiceKind::Student, PeersConfig::default()).await;
        let professor = RunningService::start(ServiceKind::Professor, PeersConfig::default()).await;
        let course = RunningService::start(ServiceKind::Course, PeersConfig::default()).await;
        let auth = RunningService::start(
            ServiceKind::Auth,
            PeersConfig {
                student: Some(student.base_url.clone()),
                professor: Some(professor.base_url.clone()),
                course: None,
            },
        )
        .await;
        let enrollment = RunningService::start(
            ServiceKind::Enrollment,
            PeersConfig {
                student: Some(student.base_url.clone()),
                professor: None,
                course: Some(course.base_url.clone()),
            },
        )
        .await;

        Self {
            auth,
            student,
            professor,
            course,
            enrollment,
        }
    }
}

/// Plain HTTP client
pub fn http() -> reqwest::Client {
    reqwest::Client::new()
}

/// POST `body` as JSON with a bearer token
pub async fn post_json(url: &str, token: Option<&str>, body: &Value) -> reqwest::Response {
    let mut request = http().post(url).json(body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    request.send().await.unwrap()
}

/// GET with a bearer token
pub async fn get(url: &str, token: Option<&str>) -> reqwest::Response {
    let mut request = http().get(url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    request.send().await.unwrap()
}

/// Response body as JSON
pub async fn json(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}
