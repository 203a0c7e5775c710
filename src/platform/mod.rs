pub mod line;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A text message received from the chat platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// The message text
    pub text: String,
    /// Single-use handle identifying where the reply goes
    pub reply_token: String,
}

/// A message to send back. Serializes to the LINE message object shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "originalContentUrl")]
        original_content_url: String,
        #[serde(rename = "previewImageUrl")]
        preview_image_url: String,
    },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text { text: text.into() }
    }

    pub fn image(original: impl Into<String>, preview: impl Into<String>) -> Self {
        OutboundMessage::Image {
            original_content_url: original.into(),
            preview_image_url: preview.into(),
        }
    }
}

/// Delivers routed replies to the originating conversation.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn deliver(&self, reply_token: &str, messages: &[OutboundMessage]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_serializes_to_line_shape() {
        let text = serde_json::to_value(OutboundMessage::text("hi")).unwrap();
        assert_eq!(text, json!({"type": "text", "text": "hi"}));

        let image =
            serde_json::to_value(OutboundMessage::image("https://a/full.jpg", "https://a/p.jpg"))
                .unwrap();
        assert_eq!(
            image,
            json!({
                "type": "image",
                "originalContentUrl": "https://a/full.jpg",
                "previewImageUrl": "https://a/p.jpg"
            })
        );
    }
}
