//! Generic HTTP sink: POSTs the structured [`Message`] as JSON, for
//! downstream systems that want the graded fields rather than flattened
//! text.

use async_trait::async_trait;

use super::NotificationSink;
use crate::message::Message;

pub struct GenericHttpSink {
	endpoint: String,
	client: reqwest::Client,
}

impl GenericHttpSink {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self { endpoint: endpoint.into(), client: reqwest::Client::new() }
	}
}

#[async_trait]
impl NotificationSink for GenericHttpSink {
	async fn notify(&self, message: &Message) -> anyhow::Result<()> {
		self.client.post(&self.endpoint).json(message).send().await?.error_for_status()?;
		Ok(())
	}

	fn name(&self) -> &str {
		"generic_http"
	}
}
