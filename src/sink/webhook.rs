//! Discord-compatible webhook sink.
//!
//! The sink identifier of a scope's display or alert target is the webhook
//! URL. Status views are posted as embeds and edited in place afterwards;
//! alerts are posted as plain messages.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{alert_text, AlertBatch, AlertSink, DisplaySink, RenderRequest, SinkError, StatusView, ViewStyle};

/// Zero-width space, used as a blank embed field name.
const BLANK: &str = "\u{200b}";

/// Posts status views and alerts to webhooks.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    style: ViewStyle,
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: Value,
}

impl WebhookSink {
    /// Create a sink with the given view style and request timeout.
    pub fn new(style: ViewStyle, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chubwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, style })
    }

    /// Build the embed payload for a view.
    pub fn embed_payload(view: &StatusView) -> Value {
        let mut fields = vec![
            json!({ "name": "API", "value": view.api_line, "inline": false }),
            json!({ "name": view.history_header, "value": view.entity_block(), "inline": false }),
            json!({ "name": BLANK, "value": view.link_line, "inline": false }),
        ];
        if let Some(hint) = &view.subscription_hint {
            fields.push(json!({ "name": BLANK, "value": hint, "inline": false }));
        }

        json!({
            "embeds": [{
                "title": view.title,
                "color": view.colour,
                "fields": fields,
                "footer": { "text": view.footer },
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }]
        })
    }

    async fn create(&self, url: &str, payload: &Value) -> Result<String, SinkError> {
        let response = self
            .client
            .post(url)
            .query(&[("wait", "true")])
            .json(payload)
            .send()
            .await?;
        let created: CreatedMessage = check(response).await?.json().await?;

        match created.id {
            Value::String(id) => Ok(id),
            Value::Number(id) => Ok(id.to_string()),
            other => Err(SinkError::Encode(format!("unexpected message id: {}", other))),
        }
    }

    /// Edit an existing message. Returns false when the message is gone.
    async fn edit(&self, url: &str, message: &str, payload: &Value) -> Result<bool, SinkError> {
        let response = self
            .client
            .patch(format!("{}/messages/{}", url.trim_end_matches('/'), message))
            .json(payload)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }
}

async fn check(response: Response) -> Result<Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(SinkError::Rejected {
        status: status.as_u16(),
        detail: detail.chars().take(200).collect(),
    })
}

#[async_trait]
impl DisplaySink for WebhookSink {
    async fn render(&self, request: &RenderRequest) -> Result<Option<String>, SinkError> {
        let view = StatusView::build(request, &self.style);
        let payload = Self::embed_payload(&view);
        let url = request.target.sink.as_str();

        if let Some(message) = &request.target.message {
            if self.edit(url, message, &payload).await? {
                debug!(scope = %request.scope, message = %message, "Edited status message");
                return Ok(None);
            }
            info!(scope = %request.scope, message = %message, "Status message is gone, creating a new one");
        }

        let id = self.create(url, &payload).await?;
        info!(scope = %request.scope, message = %id, "Created status message");
        Ok(Some(id))
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn dispatch(&self, batch: &AlertBatch) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&batch.target.sink)
            .json(&json!({ "content": alert_text(batch) }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
