//! LINE Messaging API: webhook signature check, event decoding and the
//! reply endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::config::LineConfig;
use crate::platform::{IncomingMessage, OutboundMessage, ReplySink};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// LINE rejects reply requests carrying more than five messages.
const MAX_REPLY_MESSAGES: usize = 5;

/// Check `X-Line-Signature`: base64 of HMAC-SHA256 over the raw body,
/// keyed with the channel secret.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = match BASE64.decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!("Signature header is not valid base64");
            return false;
        }
    };

    let mut mac = match HmacSha256::new_from_slice(channel_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
pub(crate) fn sign(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes()).unwrap();
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Webhook request body. Only the parts routing needs are modelled.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    Message {
        /// Absent on events delivered in standby mode.
        #[serde(default, rename = "replyToken")]
        reply_token: Option<String>,
        message: MessageContent,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).context("Failed to decode webhook payload")
    }

    /// Text-message events in arrival order; everything else is skipped.
    pub fn into_text_messages(self) -> Vec<IncomingMessage> {
        self.events
            .into_iter()
            .filter_map(|event| match event {
                WebhookEvent::Message {
                    reply_token: Some(reply_token),
                    message: MessageContent::Text { text },
                } => Some(IncomingMessage { text, reply_token }),
                WebhookEvent::Message {
                    reply_token: None,
                    message: MessageContent::Text { .. },
                } => {
                    debug!("Skipping text message event without a reply token");
                    None
                }
                WebhookEvent::Message { .. } => {
                    debug!("Skipping non-text message event");
                    None
                }
                WebhookEvent::Other => {
                    debug!("Skipping non-message event");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: &'a [OutboundMessage],
}

/// Sends replies through `POST /v2/bot/message/reply`.
pub struct LineMessagingClient {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl LineMessagingClient {
    pub fn new(config: &LineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: config.channel_access_token.clone(),
        }
    }
}

#[async_trait]
impl ReplySink for LineMessagingClient {
    async fn deliver(&self, reply_token: &str, messages: &[OutboundMessage]) -> Result<()> {
        if messages.is_empty() {
            anyhow::bail!("Refusing to send an empty reply");
        }
        if messages.len() > MAX_REPLY_MESSAGES {
            anyhow::bail!(
                "Reply has {} messages, LINE accepts at most {}",
                messages.len(),
                MAX_REPLY_MESSAGES
            );
        }

        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let request = ReplyRequest {
            reply_token,
            messages,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .context("Failed to send reply to LINE")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("LINE reply API error ({}): {}", status, error_body);
        }

        debug!("Delivered {} message(s) to LINE", messages.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "channel-secret";

    #[test]
    fn test_signature_accepts_valid() {
        let body = br#"{"events":[]}"#;
        let sig = sign(SECRET, body);
        assert!(verify_signature(SECRET, body, &sig));
    }

    #[test]
    fn test_signature_rejects_tampered_body() {
        let sig = sign(SECRET, br#"{"events":[]}"#);
        assert!(!verify_signature(SECRET, br#"{"events":[{}]}"#, &sig));
    }

    #[test]
    fn test_signature_rejects_wrong_secret() {
        let body = br#"{"events":[]}"#;
        let sig = sign("another-secret", body);
        assert!(!verify_signature(SECRET, body, &sig));
    }

    #[test]
    fn test_signature_rejects_garbage() {
        assert!(!verify_signature(SECRET, b"{}", "not base64!!"));
        assert!(!verify_signature(SECRET, b"{}", ""));
    }

    #[test]
    fn test_parse_extracts_text_messages_only() {
        let body = json!({
            "destination": "Uxxxxxxxx",
            "events": [
                {
                    "type": "message",
                    "replyToken": "token-1",
                    "source": {"type": "user", "userId": "U1"},
                    "timestamp": 1700000000000u64,
                    "message": {"id": "1", "type": "text", "text": "你好"}
                },
                {
                    "type": "message",
                    "replyToken": "token-2",
                    "message": {"id": "2", "type": "sticker", "packageId": "1", "stickerId": "1"}
                },
                {
                    "type": "follow",
                    "replyToken": "token-3",
                    "source": {"type": "user", "userId": "U2"}
                },
                {
                    "type": "message",
                    "replyToken": "token-4",
                    "message": {"id": "4", "type": "text", "text": "second"}
                }
            ]
        });

        let payload = WebhookPayload::parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(payload.destination.as_deref(), Some("Uxxxxxxxx"));

        let messages = payload.into_text_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "你好");
        assert_eq!(messages[0].reply_token, "token-1");
        assert_eq!(messages[1].text, "second");
        assert_eq!(messages[1].reply_token, "token-4");
    }

    #[test]
    fn test_parse_skips_standby_event_without_reply_token() {
        let body = json!({
            "events": [
                {
                    "type": "message",
                    "mode": "standby",
                    "source": {"type": "user", "userId": "U1"},
                    "message": {"id": "1", "type": "text", "text": "ignored"}
                },
                {
                    "type": "message",
                    "mode": "active",
                    "replyToken": "token-2",
                    "message": {"id": "2", "type": "text", "text": "answer me"}
                }
            ]
        });

        let messages = WebhookPayload::parse(body.to_string().as_bytes())
            .unwrap()
            .into_text_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].reply_token, "token-2");
        assert_eq!(messages[0].text, "answer me");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(WebhookPayload::parse(b"events=1").is_err());
    }

    fn client_for(server: &MockServer) -> LineMessagingClient {
        LineMessagingClient::new(&LineConfig {
            channel_secret: SECRET.to_string(),
            channel_access_token: "access-token".to_string(),
            api_base: server.uri(),
        })
    }

    #[tokio::test]
    async fn test_deliver_posts_reply_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .and(header("authorization", "Bearer access-token"))
            .and(body_json(json!({
                "replyToken": "token-1",
                "messages": [
                    {"type": "image", "originalContentUrl": "https://a/o.jpg", "previewImageUrl": "https://a/p.jpg"},
                    {"type": "text", "text": "share it"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let messages = vec![
            OutboundMessage::image("https://a/o.jpg", "https://a/p.jpg"),
            OutboundMessage::text("share it"),
        ];
        client_for(&server)
            .deliver("token-1", &messages)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deliver_surfaces_api_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "Invalid reply token"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .deliver("expired", &[OutboundMessage::text("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid reply token"));
    }

    #[tokio::test]
    async fn test_deliver_rejects_empty_reply() {
        let server = MockServer::start().await;
        assert!(client_for(&server).deliver("token", &[]).await.is_err());
    }
}
