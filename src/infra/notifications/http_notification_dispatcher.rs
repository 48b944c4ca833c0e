use crate::domain::ports::NotificationDispatcher;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::error;

pub struct HttpNotificationDispatcher {
    client: Client,
    api_url: String,
    api_key: String,
}

impl HttpNotificationDispatcher {
    pub fn new(api_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, api_url, api_key }
    }
}

#[derive(Serialize)]
struct NotificationPayload<'a> {
    event_type: &'a str,
    recipient_id: &'a str,
    data: &'a serde_json::Value,
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    async fn notify(&self, event_type: &str, recipient: &str, payload: &serde_json::Value) -> Result<(), AppError> {
        let body = NotificationPayload {
            event_type,
            recipient_id: recipient,
            data: payload,
        };

        let res = self.client.post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let msg = format!("Notification service connection error: {}", e);
                error!("{}", msg);
                AppError::InternalWithMsg(msg)
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            let msg = format!("Notification service failed. Status: {}, Body: {}", status, text);
            error!("{}", msg);
            return Err(AppError::InternalWithMsg(msg));
        }

        Ok(())
    }
}
