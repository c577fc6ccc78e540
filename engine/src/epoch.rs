//! Epoch calculus: mapping a block timestamp
//! to a voting or reward epoch id, and back to the epoch's start/end times.
//!
//! Modeled as small, `Copy` value types carrying their own duration so that
//! `.next()`/`.previous()` don't need to thread a factory reference through
//! the rest of the pipeline — `VotingRoundManager`, `ParsedPayloadMapper` and
//! friends all key on `VotingEpoch` by value.

use std::hash::{Hash, Hasher};

use crate::constants::{REVEAL_DEADLINE_OFFSET_SECONDS, VOTING_EPOCH_DURATION_SECONDS};

/// One FTSO/FDC voting round's time window.
#[derive(Debug, Clone, Copy)]
pub struct VotingEpoch {
	pub id: u32,
	duration_s: i64,
	first_epoch_start_s: i64,
}

impl VotingEpoch {
	pub fn start_s(&self) -> i64 {
		self.first_epoch_start_s + self.id as i64 * self.duration_s
	}

	pub fn end_s(&self) -> i64 {
		self.start_s() + self.duration_s
	}

	/// End of the reveal window for this epoch.
	pub fn reveal_deadline(&self) -> i64 {
		self.start_s() + REVEAL_DEADLINE_OFFSET_SECONDS
	}

	pub fn next(&self) -> VotingEpoch {
		VotingEpoch { id: self.id + 1, ..*self }
	}

	pub fn previous(&self) -> VotingEpoch {
		VotingEpoch { id: self.id.saturating_sub(1), ..*self }
	}
}

impl PartialEq for VotingEpoch {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for VotingEpoch {}

impl Hash for VotingEpoch {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl PartialOrd for VotingEpoch {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for VotingEpoch {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.id.cmp(&other.id)
	}
}

/// Produces `VotingEpoch`s from either a timestamp or an explicit id, all
/// sharing the same genesis/duration parameters (from configuration).
#[derive(Debug, Clone, Copy)]
pub struct VotingEpochFactory {
	pub first_epoch_start_s: i64,
	pub duration_s: i64,
}

impl VotingEpochFactory {
	pub fn new(first_epoch_start_s: i64, duration_s: i64) -> Self {
		Self { first_epoch_start_s, duration_s }
	}

	pub fn default_mainnet() -> Self {
		Self::new(1658429955, VOTING_EPOCH_DURATION_SECONDS)
	}

	pub fn epoch(&self, id: u32) -> VotingEpoch {
		VotingEpoch { id, duration_s: self.duration_s, first_epoch_start_s: self.first_epoch_start_s }
	}

	pub fn from_timestamp(&self, timestamp_s: i64) -> VotingEpoch {
		let id = (timestamp_s - self.first_epoch_start_s).div_euclid(self.duration_s);
		self.epoch(id.max(0) as u32)
	}
}

/// One reward epoch: a longer window across which a single `SigningPolicy`
/// applies.
#[derive(Debug, Clone, Copy)]
pub struct RewardEpoch {
	pub id: u32,
	duration_s: i64,
	first_epoch_start_s: i64,
}

impl RewardEpoch {
	pub fn start_s(&self) -> i64 {
		self.first_epoch_start_s + self.id as i64 * self.duration_s
	}

	pub fn next(&self) -> RewardEpoch {
		RewardEpoch { id: self.id + 1, ..*self }
	}

	pub fn previous(&self) -> RewardEpoch {
		RewardEpoch { id: self.id.saturating_sub(1), ..*self }
	}
}

impl PartialEq for RewardEpoch {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for RewardEpoch {}

impl Hash for RewardEpoch {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

#[derive(Debug, Clone, Copy)]
pub struct RewardEpochFactory {
	pub first_epoch_start_s: i64,
	pub duration_s: i64,
}

impl RewardEpochFactory {
	pub fn new(first_epoch_start_s: i64, duration_s: i64) -> Self {
		Self { first_epoch_start_s, duration_s }
	}

	pub fn default_mainnet() -> Self {
		Self::new(1658429955, crate::constants::REWARD_EPOCH_DURATION_SECONDS)
	}

	pub fn epoch(&self, id: u32) -> RewardEpoch {
		RewardEpoch { id, duration_s: self.duration_s, first_epoch_start_s: self.first_epoch_start_s }
	}

	pub fn from_timestamp(&self, timestamp_s: i64) -> RewardEpoch {
		let id = (timestamp_s - self.first_epoch_start_s).div_euclid(self.duration_s);
		self.epoch(id.max(0) as u32)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn voting_factory() -> VotingEpochFactory {
		VotingEpochFactory::new(1_000_000, 90)
	}

	#[test]
	fn start_end_and_reveal_deadline() {
		let e = voting_factory().epoch(10);
		assert_eq!(e.start_s(), 1_000_000 + 900);
		assert_eq!(e.end_s(), e.start_s() + 90);
		assert_eq!(e.reveal_deadline(), e.start_s() + 45);
	}

	#[test]
	fn next_and_previous_are_inverses() {
		let e = voting_factory().epoch(5);
		assert_eq!(e.next().previous(), e);
		assert_eq!(e.next().id, 6);
		assert_eq!(e.previous().id, 4);
	}

	#[test]
	fn equality_and_hash_depend_only_on_id() {
		use std::collections::HashSet;

		let a = voting_factory().epoch(7);
		let b = VotingEpochFactory::new(999, 90).epoch(7);
		assert_eq!(a, b);

		let mut set = HashSet::new();
		set.insert(a);
		assert!(set.contains(&b));
	}

	#[test]
	fn from_timestamp_round_trips() {
		let factory = voting_factory();
		let e = factory.epoch(42);
		assert_eq!(factory.from_timestamp(e.start_s()), e);
		assert_eq!(factory.from_timestamp(e.start_s() + 1), e);
		assert_eq!(factory.from_timestamp(e.end_s()), e.next());
	}

	#[test]
	fn reward_epoch_successor() {
		let factory = RewardEpochFactory::new(1_000_000, 302_400);
		let e = factory.epoch(3);
		assert_eq!(e.next().id, 4);
		assert_eq!(e.next().start_s(), e.start_s() + 302_400);
	}
}
