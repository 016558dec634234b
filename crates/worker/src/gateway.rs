//! Outbound SMS gateway adapter.
//!
//! The pipeline only ever talks to the provider through the `SmsGateway`
//! trait: one message in, an explicit delivered/rejected outcome back.
//! Provider rejections are data, not errors — only transport-level surprises
//! (building the client, serializing the request) surface as `AppError`.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use courier_common::config::AppConfig;
use courier_common::error::AppError;

/// Delivery context attached to every send, used by the provider for
/// tracing and by us when correlating retries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SendMetadata {
    pub is_retry: bool,
    pub attempt_number: i32,
    pub original_error: Option<String>,
    pub retry_id: Option<Uuid>,
}

/// Outcome of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { message_id: String },
    Rejected { error: String },
}

/// One outbound message gateway.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, destination: &str, body: &str, meta: &SendMetadata) -> SendOutcome;
}

/// HTTP JSON gateway adapter.
///
/// POSTs `{to, body, metadata}` to the configured endpoint and expects
/// `{"message_id": "..."}` on 2xx. The configured send timeout is enforced
/// at this layer.
pub struct HttpSmsGateway {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    to: &'a str,
    body: &'a str,
    metadata: &'a SendMetadata,
}

#[derive(serde::Deserialize)]
struct GatewayResponse {
    message_id: String,
}

impl HttpSmsGateway {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let endpoint = config
            .sms_gateway_url
            .clone()
            .ok_or_else(|| AppError::Config("SMS_GATEWAY_URL is required".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.sms_send_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            token: config.sms_gateway_token.clone(),
        })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send(&self, destination: &str, body: &str, meta: &SendMetadata) -> SendOutcome {
        let request = GatewayRequest {
            to: destination,
            body,
            metadata: meta,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                return SendOutcome::Rejected {
                    error: format!("gateway request failed: {}", e),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return SendOutcome::Rejected {
                error: format!("gateway returned {}: {}", status, detail),
            };
        }

        match response.json::<GatewayResponse>().await {
            Ok(parsed) => SendOutcome::Delivered {
                message_id: parsed.message_id,
            },
            Err(e) => SendOutcome::Rejected {
                error: format!("gateway response unreadable: {}", e),
            },
        }
    }
}

/// Scripted gateway for tests: pops pre-queued outcomes in order and records
/// every call. An exhausted script delivers with a generated id.
pub struct MockSmsGateway {
    outcomes: std::sync::Mutex<std::collections::VecDeque<SendOutcome>>,
    calls: std::sync::Mutex<Vec<RecordedSend>>,
}

/// One captured `send` invocation.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub destination: String,
    pub body: String,
    pub meta: SendMetadata,
}

impl MockSmsGateway {
    pub fn new() -> Self {
        Self {
            outcomes: std::sync::Mutex::new(std::collections::VecDeque::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes returned by subsequent sends, in order.
    pub fn script(self, outcomes: impl IntoIterator<Item = SendOutcome>) -> Self {
        self.outcomes.lock().unwrap().extend(outcomes);
        self
    }

    /// Shorthand for a gateway that rejects `n` times with `error`.
    pub fn rejecting(n: usize, error: &str) -> Self {
        Self::new().script((0..n).map(|_| SendOutcome::Rejected {
            error: error.to_string(),
        }))
    }

    pub fn calls(&self) -> Vec<RecordedSend> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockSmsGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmsGateway for MockSmsGateway {
    async fn send(&self, destination: &str, body: &str, meta: &SendMetadata) -> SendOutcome {
        self.calls.lock().unwrap().push(RecordedSend {
            destination: destination.to_string(),
            body: body.to_string(),
            meta: meta.clone(),
        });

        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SendOutcome::Delivered {
                message_id: Uuid::new_v4().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_pops_scripted_outcomes() {
        let gateway = MockSmsGateway::new().script([
            SendOutcome::Rejected {
                error: "throttled".to_string(),
            },
            SendOutcome::Delivered {
                message_id: "msg-1".to_string(),
            },
        ]);

        let meta = SendMetadata::default();
        let first = gateway.send("+15550100", "hello", &meta).await;
        assert_eq!(
            first,
            SendOutcome::Rejected {
                error: "throttled".to_string()
            }
        );

        let second = gateway.send("+15550100", "hello", &meta).await;
        assert_eq!(
            second,
            SendOutcome::Delivered {
                message_id: "msg-1".to_string()
            }
        );
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_records_metadata() {
        let gateway = MockSmsGateway::new();
        let meta = SendMetadata {
            is_retry: true,
            attempt_number: 2,
            original_error: Some("timeout".to_string()),
            retry_id: Some(Uuid::new_v4()),
        };

        gateway.send("+15550100", "retry body", &meta).await;

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].meta.is_retry);
        assert_eq!(calls[0].meta.attempt_number, 2);
        assert_eq!(calls[0].body, "retry body");
    }

    #[tokio::test]
    async fn test_mock_default_delivers() {
        let gateway = MockSmsGateway::new();
        match gateway.send("+15550100", "x", &SendMetadata::default()).await {
            SendOutcome::Delivered { message_id } => assert!(!message_id.is_empty()),
            other => panic!("expected delivery, got {:?}", other),
        }
    }
}
