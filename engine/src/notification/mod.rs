//! Notification fan-out: a small async trait plus an emitter that fans one
//! event out to every configured sink and isolates each sink's failures from
//! the others.

pub mod discord;
pub mod generic;
pub mod slack;
pub mod telegram;
pub mod tracing_sink;

use async_trait::async_trait;

use crate::message::Message;

#[async_trait]
pub trait NotificationSink: Send + Sync {
	async fn notify(&self, message: &Message) -> anyhow::Result<()>;

	/// Used only in log lines; doesn't need to be unique.
	fn name(&self) -> &str;
}

/// Fans a [`Message`] out to every configured sink. A transport outage on
/// one sink (a webhook 500, a DNS failure) must not stop the others from
/// receiving the same issue, so failures are logged and swallowed here
/// rather than propagated.
pub struct IssueEmitter {
	sinks: Vec<Box<dyn NotificationSink>>,
}

impl IssueEmitter {
	pub fn new(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
		Self { sinks }
	}

	pub async fn emit(&self, message: &Message) {
		for sink in &self.sinks {
			if let Err(error) = sink.notify(message).await {
				tracing::warn!(sink = sink.name(), %error, "notification sink failed");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	use async_trait::async_trait;

	use super::*;
	use crate::message::MessageLevel;

	struct FailingSink;

	#[async_trait]
	impl NotificationSink for FailingSink {
		async fn notify(&self, _message: &Message) -> anyhow::Result<()> {
			anyhow::bail!("always fails")
		}

		fn name(&self) -> &str {
			"failing"
		}
	}

	struct CountingSink(Arc<AtomicUsize>);

	#[async_trait]
	impl NotificationSink for CountingSink {
		async fn notify(&self, _message: &Message) -> anyhow::Result<()> {
			self.0.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}

		fn name(&self) -> &str {
			"counting"
		}
	}

	#[tokio::test]
	async fn one_failing_sink_does_not_stop_the_others() {
		let counter = Arc::new(AtomicUsize::new(0));
		let emitter = IssueEmitter::new(vec![
			Box::new(FailingSink),
			Box::new(CountingSink(counter.clone())),
		]);

		let epoch = crate::epoch::VotingEpochFactory::default_mainnet().epoch(1);
		let message = Message::builder(MessageLevel::Error, 100, epoch).text("x").build();
		emitter.emit(&message).await;

		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}
}
