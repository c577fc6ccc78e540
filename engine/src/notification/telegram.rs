//! Telegram bot sink, posting through the bot API's
//! `sendMessage` endpoint.

use async_trait::async_trait;
use serde::Serialize;

use super::NotificationSink;
use crate::message::Message;

pub struct TelegramSink {
	bot_token: String,
	chat_id: String,
	client: reqwest::Client,
}

impl TelegramSink {
	pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
		Self { bot_token: bot_token.into(), chat_id: chat_id.into(), client: reqwest::Client::new() }
	}

	fn endpoint(&self) -> String {
		format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token)
	}
}

#[derive(Serialize)]
struct TelegramPayload<'a> {
	chat_id: &'a str,
	text: &'a str,
}

#[async_trait]
impl NotificationSink for TelegramSink {
	async fn notify(&self, message: &Message) -> anyhow::Result<()> {
		let body = message.as_plain_text();
		self.client
			.post(self.endpoint())
			.json(&TelegramPayload { chat_id: &self.chat_id, text: &body })
			.send()
			.await?
			.error_for_status()?;
		Ok(())
	}

	fn name(&self) -> &str {
		"telegram"
	}
}
