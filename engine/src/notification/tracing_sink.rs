//! Always-active sink that logs every issue through `tracing`, regardless of
//! which webhook transports are configured.

use async_trait::async_trait;

use super::NotificationSink;
use crate::message::{Message, MessageLevel};

pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
	async fn notify(&self, message: &Message) -> anyhow::Result<()> {
		match message.level {
			MessageLevel::Info => tracing::info!(
				protocol_id = message.protocol_id,
				voting_round_id = message.voting_round_id,
				entity = ?message.entity,
				"{}", message.text
			),
			MessageLevel::Warning => tracing::warn!(
				protocol_id = message.protocol_id,
				voting_round_id = message.voting_round_id,
				entity = ?message.entity,
				"{}", message.text
			),
			MessageLevel::Error | MessageLevel::Critical => tracing::error!(
				protocol_id = message.protocol_id,
				voting_round_id = message.voting_round_id,
				entity = ?message.entity,
				"{}", message.text
			),
		}
		Ok(())
	}

	fn name(&self) -> &str {
		"tracing"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn notify_never_fails() {
		let epoch = crate::epoch::VotingEpochFactory::default_mainnet().epoch(1);
		let message = Message::builder(MessageLevel::Critical, 200, epoch).text("x").build();
		assert!(TracingSink.notify(&message).await.is_ok());
	}
}
