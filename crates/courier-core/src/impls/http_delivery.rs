//! HttpDelivery - POST one envelope per request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::domain::{DeliveryFailure, DeliveryOutcome, EventEnvelope};
use crate::ports::DeliveryAdapter;

/// HTTP delivery configuration.
#[derive(Debug, Clone)]
pub struct HttpDeliveryConfig {
    /// Destination URL; envelopes are POSTed here as JSON.
    pub endpoint: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub auth_token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl HttpDeliveryConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Delivery adapter backed by `reqwest`.
///
/// Classification:
/// - 2xx → success
/// - any other status → `Rejected { status, body }`
/// - connect failure → `Transport { connectivity_lost: true }`
/// - request timeout → `Timeout`
/// - anything else → `Transport { connectivity_lost: false }`
pub struct HttpDelivery {
    config: HttpDeliveryConfig,
    client: Client,
}

impl HttpDelivery {
    pub fn new(config: HttpDeliveryConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn classify(&self, err: reqwest::Error) -> DeliveryFailure {
        if err.is_timeout() {
            DeliveryFailure::timeout(self.config.timeout.as_millis() as u64)
        } else if err.is_connect() {
            DeliveryFailure::connectivity_lost(err.to_string())
        } else {
            DeliveryFailure::transport(err.to_string())
        }
    }
}

#[async_trait]
impl DeliveryAdapter for HttpDelivery {
    async fn send(&self, envelope: &EventEnvelope) -> DeliveryOutcome {
        debug!(
            url = %self.config.endpoint,
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            "Sending event"
        );

        let mut request = self.client.post(&self.config.endpoint).json(envelope);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.ok().filter(|b| !b.is_empty());
        Err(DeliveryFailure::rejected(status.as_u16(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventId, EventType};
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use ulid::Ulid;

    fn envelope() -> EventEnvelope {
        EventEnvelope::new(
            EventId::from_ulid(Ulid::new()),
            EventType::new("telemetry.ping"),
            serde_json::json!({"n": 1}),
            Utc::now(),
        )
    }

    /// Serve exactly one request with a canned response; returns the raw
    /// request text.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/events", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).into_owned()
        });

        (url, handle)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        buf.len() >= header_end + 4 + content_length
    }

    #[tokio::test]
    async fn success_status_is_delivered() {
        let (url, server) =
            serve_once("HTTP/1.1 204 No Content\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        let mut config = HttpDeliveryConfig::new(url);
        config.auth_token = Some("secret".into());
        let delivery = HttpDelivery::new(config).unwrap();

        let env = envelope();
        delivery.send(&env).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /events"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains("\"type\":\"telemetry.ping\""));
    }

    #[tokio::test]
    async fn error_status_is_rejected_with_body() {
        let (url, server) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
        )
        .await;
        let delivery = HttpDelivery::new(HttpDeliveryConfig::new(url)).unwrap();

        let err = delivery.send(&envelope()).await.unwrap_err();
        server.await.unwrap();

        assert_eq!(err, DeliveryFailure::rejected(503, Some("busy".into())));
        assert!(!err.is_connectivity_loss());
    }

    #[tokio::test]
    async fn refused_connection_is_connectivity_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/events", listener.local_addr().unwrap());
        drop(listener);

        let delivery = HttpDelivery::new(HttpDeliveryConfig::new(url)).unwrap();
        let err = delivery.send(&envelope()).await.unwrap_err();

        assert!(err.is_connectivity_loss(), "unexpected: {err:?}");
    }
}
