//! `SocketConnector` over the gateway's HTTP API.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use linkbot_core::session::{SessionSocket, SocketConnector, SocketHandle};
use linkbot_types::config::GatewayConfig;
use linkbot_types::error::SocketError;
use linkbot_types::session::{CorrespondentId, SessionId};
use linkbot_types::socket::Credentials;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, warn};

use super::GatewayInbox;

#[derive(Serialize)]
struct ConnectRequest {
    credentials: Option<String>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    text: &'a str,
}

struct GatewayClient {
    http: reqwest::Client,
    base: String,
    token: Option<SecretString>,
}

impl GatewayClient {
    fn request(&self, method: Method, id: &SessionId, suffix: &str) -> RequestBuilder {
        let url = format!("{}/sessions/{}{}", self.base, id, suffix);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn call(&self, builder: RequestBuilder) -> Result<(), SocketError> {
        let response = builder
            .send()
            .await
            .map_err(|e| SocketError::Transient(format!("gateway unreachable: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, body.trim()))
    }
}

/// Client errors mean the request can never succeed as sent.
fn classify(status: StatusCode, body: &str) -> SocketError {
    let message = if body.is_empty() {
        format!("gateway returned {status}")
    } else {
        format!("gateway returned {status}: {body}")
    };
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::UNPROCESSABLE_ENTITY => SocketError::Fatal(message),
        _ => SocketError::Transient(message),
    }
}

/// Opens sockets through the gateway.
///
/// Without a `[gateway]` section every open fails fatally, so sessions land
/// in `disconnected` with an explanatory `last_error` instead of retrying.
pub struct GatewayConnector {
    client: Option<Arc<GatewayClient>>,
    inbox: Arc<GatewayInbox>,
}

impl GatewayConnector {
    pub fn new(config: &GatewayConfig, inbox: Arc<GatewayInbox>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client: Some(Arc::new(GatewayClient {
                http,
                base: config.url.trim_end_matches('/').to_string(),
                token: config.token.clone(),
            })),
            inbox,
        })
    }

    pub fn unconfigured(inbox: Arc<GatewayInbox>) -> Self {
        Self {
            client: None,
            inbox,
        }
    }

    pub fn from_config(
        config: Option<&GatewayConfig>,
        inbox: Arc<GatewayInbox>,
    ) -> Result<Self, reqwest::Error> {
        match config {
            Some(config) => Self::new(config, inbox),
            None => Ok(Self::unconfigured(inbox)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

impl SocketConnector for GatewayConnector {
    type Socket = GatewaySocket;

    async fn open(
        &self,
        id: &SessionId,
        credentials: Option<Credentials>,
    ) -> Result<SocketHandle<GatewaySocket>, SocketError> {
        let Some(client) = &self.client else {
            return Err(SocketError::Fatal(
                "no [gateway] section in config.toml".to_string(),
            ));
        };

        // Route first so events posted during the connect call are not lost.
        let (route, events) = self.inbox.open_route(id);
        let body = ConnectRequest {
            credentials: credentials.map(|c| BASE64.encode(c.as_bytes())),
        };
        let request = client.request(Method::POST, id, "/connect").json(&body);
        if let Err(e) = client.call(request).await {
            self.inbox.close_route(id, route);
            return Err(e);
        }

        debug!(session_id = %id, route, "gateway socket opened");
        Ok(SocketHandle::new(
            GatewaySocket {
                client: Arc::clone(client),
                inbox: Arc::clone(&self.inbox),
                id: id.clone(),
                route,
            },
            events,
        ))
    }
}

/// One session's socket on the gateway.
pub struct GatewaySocket {
    client: Arc<GatewayClient>,
    inbox: Arc<GatewayInbox>,
    id: SessionId,
    route: u64,
}

impl SessionSocket for GatewaySocket {
    async fn send(&self, correspondent: &CorrespondentId, text: &str) -> Result<(), SocketError> {
        let request = self
            .client
            .request(Method::POST, &self.id, "/messages")
            .json(&SendRequest {
                to: correspondent.as_str(),
                text,
            });
        self.client.call(request).await
    }

    async fn close(&self) {
        let request = self.client.request(Method::DELETE, &self.id, "");
        if let Err(e) = self.client.call(request).await {
            warn!(session_id = %self.id, error = %e, "gateway close failed");
        }
        self.inbox.close_route(&self.id, self.route);
    }

    async fn logout(&self) -> Result<(), SocketError> {
        let request = self.client.request(Method::POST, &self.id, "/logout");
        let result = self.client.call(request).await;
        self.inbox.close_route(&self.id, self.route);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayEvent;
    use linkbot_types::socket::SocketEvent;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> GatewayConfig {
        GatewayConfig {
            url: format!("{}/", server.uri()),
            token: Some(SecretString::from("gw-token")),
            webhook_secret: None,
            timeout_secs: 5,
        }
    }

    fn sid() -> SessionId {
        SessionId::parse("bot-1").unwrap()
    }

    async fn mount_ok(server: &MockServer, verb: &str, route: &str) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn open_sends_credentials_and_routes_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/bot-1/connect"))
            .and(header("authorization", "Bearer gw-token"))
            .and(body_json(serde_json::json!({"credentials": "AQID"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let inbox = Arc::new(GatewayInbox::new());
        let connector = GatewayConnector::new(&config(&server), Arc::clone(&inbox)).unwrap();
        let mut handle = connector
            .open(&sid(), Some(Credentials::new(vec![1, 2, 3])))
            .await
            .unwrap();

        inbox.dispatch(&sid(), GatewayEvent::Opened).await.unwrap();
        assert_eq!(handle.events.recv().await, Some(SocketEvent::Opened));
    }

    #[tokio::test]
    async fn fresh_pairing_sends_null_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/bot-1/connect"))
            .and(body_json(serde_json::json!({"credentials": null})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let connector =
            GatewayConnector::new(&config(&server), Arc::new(GatewayInbox::new())).unwrap();
        connector.open(&sid(), None).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_connect_is_fatal_and_unroutes() {
        let server = MockServer::start().await;
        Mock::given(path("/sessions/bot-1/connect"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let inbox = Arc::new(GatewayInbox::new());
        let connector = GatewayConnector::new(&config(&server), Arc::clone(&inbox)).unwrap();
        match connector.open(&sid(), None).await {
            Err(SocketError::Fatal(msg)) => assert!(msg.contains("bad token")),
            Err(other) => panic!("expected fatal, got {other:?}"),
            Ok(_) => panic!("expected fatal, got a socket"),
        }
        assert_eq!(inbox.open_routes(), 0);
    }

    #[tokio::test]
    async fn gateway_outage_is_transient() {
        let server = MockServer::start().await;
        Mock::given(path("/sessions/bot-1/connect"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let connector =
            GatewayConnector::new(&config(&server), Arc::new(GatewayInbox::new())).unwrap();
        assert!(matches!(
            connector.open(&sid(), None).await,
            Err(SocketError::Transient(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_connector_fails_fatally() {
        let connector = GatewayConnector::unconfigured(Arc::new(GatewayInbox::new()));
        assert!(!connector.is_configured());
        assert!(matches!(
            connector.open(&sid(), None).await,
            Err(SocketError::Fatal(_))
        ));
    }

    #[tokio::test]
    async fn send_posts_message() {
        let server = MockServer::start().await;
        mount_ok(&server, "POST", "/sessions/bot-1/connect").await;
        Mock::given(method("POST"))
            .and(path("/sessions/bot-1/messages"))
            .and(body_json(serde_json::json!({"to": "49@s.net", "text": "hello"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let connector =
            GatewayConnector::new(&config(&server), Arc::new(GatewayInbox::new())).unwrap();
        let handle = connector.open(&sid(), None).await.unwrap();
        handle
            .socket
            .send(&CorrespondentId::new("49@s.net"), "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn logout_and_close_release_the_route() {
        let server = MockServer::start().await;
        mount_ok(&server, "POST", "/sessions/bot-1/connect").await;
        mount_ok(&server, "POST", "/sessions/bot-1/logout").await;
        mount_ok(&server, "DELETE", "/sessions/bot-1").await;

        let inbox = Arc::new(GatewayInbox::new());
        let connector = GatewayConnector::new(&config(&server), Arc::clone(&inbox)).unwrap();

        let mut handle = connector.open(&sid(), None).await.unwrap();
        handle.socket.logout().await.unwrap();
        assert_eq!(inbox.open_routes(), 0);
        assert_eq!(handle.events.recv().await, None);

        let handle = connector.open(&sid(), None).await.unwrap();
        handle.socket.close().await;
        assert_eq!(inbox.open_routes(), 0);
    }
}
