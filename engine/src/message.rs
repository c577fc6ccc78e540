//! Graded participation issues, the unit that
//! validators produce and notification sinks consume.

use ethers::types::Address;
use serde::Serialize;

use crate::epoch::VotingEpoch;

/// Severity ordering is significant: `IssueEmitter` and the webhook sinks
/// both compare levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageLevel {
	Info,
	Warning,
	Error,
	Critical,
}

impl MessageLevel {
	pub fn name(&self) -> &'static str {
		match self {
			MessageLevel::Info => "INFO",
			MessageLevel::Warning => "WARNING",
			MessageLevel::Error => "ERROR",
			MessageLevel::Critical => "CRITICAL",
		}
	}
}

/// One graded participation finding, scoped to a protocol/round/entity.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
	pub level: MessageLevel,
	pub protocol_id: u8,
	pub voting_round_id: u32,
	pub entity: Option<Address>,
	pub text: String,
}

impl Message {
	pub fn builder(level: MessageLevel, protocol_id: u8, voting_round_id: VotingEpoch) -> MessageBuilder {
		MessageBuilder {
			level,
			protocol_id,
			voting_round_id: voting_round_id.id,
			entity: None,
			text: String::new(),
		}
	}

	/// The `"<LEVEL_NAME> <message>"` rendering used for webhook
	/// transports that don't support structured fields.
	pub fn as_plain_text(&self) -> String {
		format!("{} {}", self.level.name(), self.text)
	}
}

pub struct MessageBuilder {
	level: MessageLevel,
	protocol_id: u8,
	voting_round_id: u32,
	entity: Option<Address>,
	text: String,
}

impl MessageBuilder {
	pub fn entity(mut self, entity: Address) -> Self {
		self.entity = Some(entity);
		self
	}

	pub fn text(mut self, text: impl Into<String>) -> Self {
		self.text = text.into();
		self
	}

	pub fn build(self) -> Message {
		Message {
			level: self.level,
			protocol_id: self.protocol_id,
			voting_round_id: self.voting_round_id,
			entity: self.entity,
			text: self.text,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn severity_ordering_matches_spec() {
		assert!(MessageLevel::Info < MessageLevel::Warning);
		assert!(MessageLevel::Warning < MessageLevel::Error);
		assert!(MessageLevel::Error < MessageLevel::Critical);
	}

	#[test]
	fn plain_text_prefixes_level_name() {
		let epoch = crate::epoch::VotingEpochFactory::default_mainnet().epoch(5);
		let msg = Message::builder(MessageLevel::Warning, 100, epoch)
			.text("submit1 missing")
			.build();
		assert_eq!(msg.as_plain_text(), "WARNING submit1 missing");
	}
}
