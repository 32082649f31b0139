//! Webhook emitter — POSTs matching events to registered endpoints with
//! an optional HMAC-SHA256 body signature, retrying 5xx/network failures
//! and giving up silently once the retry budget is exhausted.

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::warn;

use crate::breaker::{CircuitBreakerRegistry, Permit};
use crate::config::{WebhookConfig, WebhookEndpointConfig};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize)]
struct WebhookBody {
    event: String,
    timestamp: i64,
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

fn sign(secret: &str, body_without_signature: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(body_without_signature.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub struct WebhookEmitter {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookEmitter {
    pub fn new(config: WebhookConfig) -> Self {
        WebhookEmitter {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Fans an event out to every endpoint subscribed to it. Never
    /// propagates an error: failures are logged and swallowed. `breakers`
    /// guards each endpoint by url so a dead endpoint stops being attempted
    /// once it trips open.
    pub async fn emit(&self, event: &str, data: &Value, timestamp: i64, breakers: &CircuitBreakerRegistry) {
        if !self.config.enabled {
            return;
        }
        for endpoint in &self.config.endpoints {
            if endpoint.events.iter().any(|e| e == event) {
                self.deliver(endpoint, event, data, timestamp, breakers).await;
            }
        }
    }

    async fn deliver(
        &self,
        endpoint: &WebhookEndpointConfig,
        event: &str,
        data: &Value,
        timestamp: i64,
        breakers: &CircuitBreakerRegistry,
    ) {
        if breakers.permit(&endpoint.url).await == Permit::Blocked {
            warn!(url = %endpoint.url, event, "webhook endpoint's breaker is open, skipping delivery");
            return;
        }

        let mut body = WebhookBody {
            event: event.to_owned(),
            timestamp,
            data: data.clone(),
            signature: None,
        };
        let unsigned = serde_json::to_string(&body).unwrap_or_default();
        if let Some(secret) = &self.config.secret {
            body.signature = Some(sign(secret, &unsigned));
        }
        let payload = serde_json::to_string(&body).unwrap_or(unsigned);

        for attempt in 1..=self.config.retry_attempts {
            match self.attempt(endpoint, &payload).await {
                Ok(()) => {
                    breakers.record_success(&endpoint.url).await;
                    return;
                }
                Err(Retry::No) => {
                    breakers.record_failure(&endpoint.url).await;
                    return;
                }
                Err(Retry::Yes) => {
                    breakers.record_failure(&endpoint.url).await;
                    if attempt < self.config.retry_attempts {
                        tokio::time::sleep(self.config.retry_delay * attempt).await;
                    }
                }
            }
        }
        warn!(url = %endpoint.url, event, "webhook delivery exhausted its retry budget");
    }

    async fn attempt(&self, endpoint: &WebhookEndpointConfig, payload: &str) -> Result<(), Retry> {
        let method = reqwest::Method::from_bytes(endpoint.method.as_bytes()).unwrap_or(reqwest::Method::POST);
        let mut request = self
            .client
            .request(method, &endpoint.url)
            .timeout(self.config.timeout)
            .header("content-type", "application/json")
            .body(payload.to_owned());
        for (name, value) in &endpoint.headers {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) if response.status().is_server_error() => Err(Retry::Yes),
            Ok(response) => {
                warn!(status = %response.status(), url = %endpoint.url, "webhook endpoint rejected delivery");
                Err(Retry::No)
            }
            Err(err) => {
                warn!(error = %err, url = %endpoint.url, "webhook delivery failed");
                Err(Retry::Yes)
            }
        }
    }
}

enum Retry {
    Yes,
    No,
}
