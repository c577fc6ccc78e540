//! Discord webhook sink, posting
//! `"<LEVEL_NAME> <message>"` as the webhook's `content` field.

use async_trait::async_trait;
use serde::Serialize;

use super::NotificationSink;
use crate::message::Message;

pub struct DiscordSink {
	webhook_url: String,
	client: reqwest::Client,
}

impl DiscordSink {
	pub fn new(webhook_url: impl Into<String>) -> Self {
		Self { webhook_url: webhook_url.into(), client: reqwest::Client::new() }
	}
}

#[derive(Serialize)]
struct DiscordPayload<'a> {
	content: &'a str,
}

#[async_trait]
impl NotificationSink for DiscordSink {
	async fn notify(&self, message: &Message) -> anyhow::Result<()> {
		let body = message.as_plain_text();
		self.client
			.post(&self.webhook_url)
			.json(&DiscordPayload { content: &body })
			.send()
			.await?
			.error_for_status()?;
		Ok(())
	}

	fn name(&self) -> &str {
		"discord"
	}
}
