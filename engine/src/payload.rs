//! Generic containers for "a transaction carried a parsed payload of type
//! `T`". Each submission a sender makes within a voting round is kept;
//! validators ask for the latest-*timestamp* one inside a specific half-open
//! time window — `extract_latest` is the single place that decides which
//! submission a window selects, rather than each validator re-deriving the
//! rule.

use std::collections::HashMap;

use ethers::types::Address;

use crate::epoch::VotingEpoch;

/// Where and when on-chain a parsed payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WTxData {
	pub block: u64,
	pub tx_index: u64,
	/// Containing block's timestamp — the field every window-based selection
	/// filters on.
	pub timestamp: i64,
	pub from: Address,
	pub voting_epoch_id: VotingEpoch,
}

/// A decoded payload of type `T`, tagged with the transaction it came from.
#[derive(Debug, Clone)]
pub struct WParsedPayload<T> {
	pub tx: WTxData,
	pub payload: T,
}

/// All submissions of one payload kind from one sender within one round.
#[derive(Debug, Clone, Default)]
pub struct WParsedPayloadList<T>(Vec<WParsedPayload<T>>);

impl<T> WParsedPayloadList<T> {
	pub fn new() -> Self {
		Self(Vec::new())
	}

	pub fn push(&mut self, item: WParsedPayload<T>) {
		self.0.push(item);
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &WParsedPayload<T>> {
		self.0.iter()
	}

	/// The element with strictly-maximum `timestamp` inside the half-open
	/// range `[start, stop)`, or `None` if nothing lies inside it. Ties on
	/// timestamp break on the greatest `(block, tx_index)`, the one that
	/// actually lands last on-chain.
	pub fn extract_latest(&self, start: i64, stop: i64) -> Option<&WParsedPayload<T>> {
		self.0
			.iter()
			.filter(|p| p.tx.timestamp >= start && p.tx.timestamp < stop)
			.max_by_key(|p| (p.tx.timestamp, p.tx.block, p.tx.tx_index))
	}
}

/// Groups parsed payloads by sender address, so a validator can ask "what
/// did this identity's submit address actually send this round" in O(1).
/// A missing key behaves as an empty list rather than panicking.
#[derive(Debug, Clone, Default)]
pub struct ParsedPayloadMapper<T> {
	by_identity: HashMap<Address, WParsedPayloadList<T>>,
}

impl<T> ParsedPayloadMapper<T> {
	pub fn new() -> Self {
		Self { by_identity: HashMap::new() }
	}

	pub fn insert(&mut self, tx: WTxData, payload: T) {
		self.by_identity.entry(tx.from).or_default().push(WParsedPayload { tx, payload });
	}

	pub fn submissions_for(&self, address: &Address) -> Option<&WParsedPayloadList<T>> {
		self.by_identity.get(address)
	}

	pub fn extract_latest(&self, address: &Address, start: i64, stop: i64) -> Option<&WParsedPayload<T>> {
		self.by_identity.get(address).and_then(|list| list.extract_latest(start, stop))
	}

	pub fn senders(&self) -> impl Iterator<Item = &Address> {
		self.by_identity.keys()
	}
}
