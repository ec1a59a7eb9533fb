use super::{ApiError, MessageSink};
use crate::models::RecipientId;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SERVICE: &str = "Telegram";

/// Bot API client used for notifications and command polling
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
}

/// Envelope wrapping every Bot API response
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: RecipientId,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Chat {
    pub id: RecipientId,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> anyhow::Result<Self> {
        // Long polling holds the connection open, keep the timeout above it
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(90))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        let envelope: TelegramResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Status {
                    service: SERVICE,
                    status: status.as_u16(),
                    body: text,
                })
            }
            Err(e) => {
                return Err(ApiError::Decode {
                    service: SERVICE,
                    reason: e.to_string(),
                })
            }
        };

        if !envelope.ok {
            return Err(ApiError::Rejected {
                service: SERVICE,
                reason: envelope
                    .description
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            });
        }

        envelope.result.ok_or_else(|| ApiError::Decode {
            service: SERVICE,
            reason: "missing result".to_string(),
        })
    }

    /// Send an HTML formatted message to one chat
    pub async fn send_message(&self, chat_id: RecipientId, text: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest {
                chat_id,
                text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .send()
            .await?;

        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Long-poll for incoming updates starting at `offset`
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, ApiError> {
        let mut query = vec![("timeout", timeout_secs.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .send()
            .await?;

        Self::decode(response).await
    }
}

#[async_trait]
impl MessageSink for TelegramClient {
    async fn send_message(&self, recipient: RecipientId, text: &str) -> Result<(), ApiError> {
        TelegramClient::send_message(self, recipient, text).await
    }
}
