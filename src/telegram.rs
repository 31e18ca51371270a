//! Minimal Telegram Bot API client.
//!
//! We only need long polling, plain messages, inline keyboards and photo
//! downloads, so we talk to the HTTP API directly with `reqwest` instead
//! of pulling in a full bot framework. Serde structs cover only the
//! fields we actually read.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;

use crate::lifecycle::{Button, Controller, MessageRef, Outbound, SELECTION_PREFIX};
use crate::prelude::*;
use crate::session::UserId;

/// Long-poll wait passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// How long to wait after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

static WELCOME_TEXT: &str = "\
🤖 AI Question Answering Bot

Send me a photo of a question and I'll help you solve it!

📋 How it works:
1. Send a photo of your question
2. Choose which AI model to use
3. Get your answer!

💡 Commands:
/help - Show this help

📷 Just send a photo to get started!";

static HELP_TEXT: &str = "\
🤖 How to use this bot:

1. Send a photo of your question
2. Choose which AI model to use from the menu
3. Get your answer instantly!

💡 Tips for better results:
- Use clear, well-lit photos
- Make sure text is readable and not blurry
- Avoid shadows or glare on the text
- Hold camera steady when taking photo

🔄 You can try different AI models for different types of questions!";

/// Telegram Bot API client.
#[derive(Debug)]
pub struct Telegram {
    http: reqwest::Client,
    /// `https://api.telegram.org/bot<token>`.
    api_url: String,
    /// `https://api.telegram.org/file/bot<token>`.
    file_url: String,
}

/// Envelope for every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

/// One button per row, like the original keyboard layout.
fn keyboard(buttons: &[Button]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: buttons
            .iter()
            .map(|button| {
                vec![InlineKeyboardButton {
                    text: button.label.clone(),
                    callback_data: button.token.clone(),
                }]
            })
            .collect(),
    }
}

impl Telegram {
    pub fn new(token: &str) -> Result<Self> {
        // The client timeout must comfortably exceed the long-poll wait.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 30))
            .build()
            .context("cannot build HTTP client")?;
        Ok(Self {
            http,
            api_url: format!("https://api.telegram.org/bot{token}"),
            file_url: format!("https://api.telegram.org/file/bot{token}"),
        })
    }

    /// Call a Bot API method and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &impl Serialize,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_url))
            .json(params)
            .send()
            .await
            .with_context(|| format!("cannot call {method}"))?;
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("cannot parse {method} response"))?;
        if !envelope.ok {
            return Err(anyhow!(
                "{method} failed: {}",
                envelope.description.unwrap_or_else(|| "unknown error".to_owned())
            ));
        }
        envelope
            .result
            .ok_or_else(|| anyhow!("{method} response had no result"))
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Option<&[Button]>,
    ) -> Result<Message> {
        let mut params = json!({ "chat_id": chat_id, "text": text });
        if let Some(buttons) = buttons {
            params["reply_markup"] = serde_json::to_value(keyboard(buttons))?;
        }
        self.call("sendMessage", &params).await
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        buttons: Option<&[Button]>,
    ) -> Result<()> {
        let mut params = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(buttons) = buttons {
            params["reply_markup"] = serde_json::to_value(keyboard(buttons))?;
        }
        // The result is the edited message, or `true` for inline messages;
        // we don't care either way.
        let _: serde_json::Value = self.call("editMessageText", &params).await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    /// Fetch the raw bytes of an uploaded photo.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let info: FileInfo = self
            .call("getFile", &json!({ "file_id": file_id }))
            .await?;
        let file_path = info
            .file_path
            .ok_or_else(|| anyhow!("getFile response had no file_path"))?;
        let bytes = self
            .http
            .get(format!("{}/{file_path}", self.file_url))
            .send()
            .await
            .context("cannot download file")?
            .error_for_status()
            .context("file download failed")?
            .bytes()
            .await
            .context("cannot read file body")?;
        Ok(bytes.to_vec())
    }

    /// Long-poll for updates forever, handling each one on its own task so
    /// one user's OCR or provider call never blocks another's.
    pub async fn run(self: Arc<Self>, controller: Arc<Controller>) -> Result<()> {
        info!("bot is running; send a photo of a question or use /start");
        let mut offset = 0;
        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(err) => {
                    warn!("getUpdates failed: {err:#}");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                let telegram = self.clone();
                let controller = controller.clone();
                tokio::spawn(async move {
                    if let Err(err) = telegram.handle_update(&controller, update).await {
                        error!("error handling update: {err:#}");
                    }
                });
            }
        }
    }

    /// Route one update to the lifecycle controller.
    #[instrument(level = "debug", skip_all, fields(update_id = update.update_id))]
    async fn handle_update(&self, controller: &Controller, update: Update) -> Result<()> {
        if let Some(message) = update.message {
            let user = UserId(message.chat.id);
            if let Some(photo) = message.photo.as_deref().filter(|p| !p.is_empty()) {
                // Telegram lists photo sizes smallest first; take the
                // highest quality one.
                let largest = photo.last().expect("checked non-empty");
                let bytes = self.download_file(&largest.file_id).await?;
                controller.handle_image(user, bytes, self).await?;
            } else if let Some(text) = message.text.as_deref() {
                match text.trim() {
                    "/start" => self.send_text(user, WELCOME_TEXT).await?,
                    "/help" => self.send_text(user, HELP_TEXT).await?,
                    _ => {}
                }
            }
        } else if let Some(callback) = update.callback_query {
            // Acknowledge the button press so the client stops spinning,
            // even if handling fails below.
            if let Err(err) = self.answer_callback_query(&callback.id).await {
                warn!("answerCallbackQuery failed: {err:#}");
            }
            let (Some(data), Some(message)) = (callback.data, callback.message) else {
                return Ok(());
            };
            let user = UserId(message.chat.id);
            match data.strip_prefix(SELECTION_PREFIX) {
                Some(provider_id) => {
                    controller
                        .handle_selection(
                            user,
                            provider_id,
                            MessageRef(message.message_id),
                            self,
                        )
                        .await?;
                }
                None => {
                    self.send_text(user, "Please send a new photo to get started!")
                        .await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Outbound for Telegram {
    async fn send_text(&self, user: UserId, text: &str) -> Result<()> {
        self.send_message(user.0, text, None).await?;
        Ok(())
    }

    async fn send_selection_prompt(
        &self,
        user: UserId,
        text: &str,
        buttons: &[Button],
    ) -> Result<()> {
        self.send_message(user.0, text, Some(buttons)).await?;
        Ok(())
    }

    async fn edit_message(
        &self,
        user: UserId,
        message: MessageRef,
        text: &str,
        buttons: Option<&[Button]>,
    ) -> Result<()> {
        self.edit_message_text(user.0, message.0, text, buttons).await
    }
}
