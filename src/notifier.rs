use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::NOTIFY_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::types::Candidate;

/// Delivery of one newly-seen listing. Failure is per-item and non-fatal to
/// the run; there is no retry, a failed delivery is dropped.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, candidate: &Candidate) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Telegram
// ---------------------------------------------------------------------------

pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    /// None when TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID are not configured;
    /// notifications then become a debug-logged no-op.
    credentials: Option<(String, String)>,
}

impl TelegramNotifier {
    pub fn new(
        api_url: String,
        bot_token: Option<String>,
        chat_id: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()?;
        let credentials = match (bot_token, chat_id) {
            (Some(token), Some(chat)) => Some((token, chat)),
            _ => None,
        };
        Ok(Self {
            client,
            api_url,
            credentials,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn caption(candidate: &Candidate) -> String {
        let mut caption = format!(
            "Title = {}\nPrice = {}",
            candidate.title.trim(),
            candidate.price_display.trim()
        );
        if let Some(posted_at) = candidate.posted_at.as_deref().filter(|s| !s.is_empty()) {
            caption.push_str(&format!("\nPosted = {posted_at}"));
        }
        caption
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, candidate: &Candidate) -> Result<()> {
        let Some((token, chat_id)) = &self.credentials else {
            debug!("telegram disabled (no bot token / chat id)");
            return Ok(());
        };

        let caption = Self::caption(candidate);
        let reply_markup = json!({
            "inline_keyboard": [[ { "text": "View listing", "url": candidate.detail_url } ]]
        });

        // Listings with an image go out as a photo message, the rest as text.
        let (method, payload) = match candidate.image_url.as_deref().filter(|s| !s.is_empty()) {
            Some(image_url) => (
                "sendPhoto",
                json!({
                    "chat_id": chat_id,
                    "photo": image_url,
                    "caption": caption,
                    "reply_markup": reply_markup,
                }),
            ),
            None => (
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": caption,
                    "reply_markup": reply_markup,
                }),
            ),
        };

        let url = format!("{}/bot{}/{}", self.api_url, token, method);
        self.client
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::Notify(e.to_string()))?;
        Ok(())
    }
}
