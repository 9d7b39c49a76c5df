//! Webhook notification for urgent feedback. Failures here must never
//! bubble up into the ingestion path, so every error is logged and
//! swallowed.

use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use crate::models::{Department, Sentiment};

pub struct UrgentAlertPayload {
    pub id: Uuid,
    pub department: Department,
    pub sentiment: Sentiment,
    pub raw_content: String,
}

pub struct AlertNotifier {
    http: Client,
    webhook_url: Option<String>,
}

impl AlertNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self { http: Client::new(), webhook_url }
    }

    pub async fn notify(&self, payload: UrgentAlertPayload) {
        let message = format!(
            "**URGENT FEEDBACK**\n**ID:** `{}`\n**Dept:** {}\n**Sent:** {}\n**Msg:** {}",
            payload.id, payload.department, payload.sentiment, payload.raw_content
        );

        let Some(url) = self.webhook_url.as_ref() else {
            tracing::error!("MOCK ALERT: {}", message);
            return;
        };

        let result = self.http.post(url).json(&json!({ "content": message })).send().await;

        if let Err(e) = result {
            tracing::error!(error = %e, "failed to send urgent feedback alert");
        }
    }
}
