//! Slack incoming-webhook sink.

use async_trait::async_trait;
use serde::Serialize;

use super::NotificationSink;
use crate::message::Message;

pub struct SlackSink {
	webhook_url: String,
	client: reqwest::Client,
}

impl SlackSink {
	pub fn new(webhook_url: impl Into<String>) -> Self {
		Self { webhook_url: webhook_url.into(), client: reqwest::Client::new() }
	}
}

#[derive(Serialize)]
struct SlackPayload<'a> {
	text: &'a str,
}

#[async_trait]
impl NotificationSink for SlackSink {
	async fn notify(&self, message: &Message) -> anyhow::Result<()> {
		let body = message.as_plain_text();
		self.client
			.post(&self.webhook_url)
			.json(&SlackPayload { text: &body })
			.send()
			.await?
			.error_for_status()?;
		Ok(())
	}

	fn name(&self) -> &str {
		"slack"
	}
}
