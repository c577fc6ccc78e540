//! Per-round submission state and round lifecycle management. One `VotingRound` tracks everything seen on-chain for a
//! single voting epoch id across both protocols; `VotingRoundManager` owns
//! the sliding window of rounds that are still live plus the bookkeeping
//! needed to finalize and evict them.

use std::collections::{BTreeMap, HashMap};

use ethers::types::Bytes;

use crate::{
	epoch::{VotingEpoch, VotingEpochFactory},
	events::{AttestationRequest, ProtocolMessageRelayed},
	parsers::{FdcSubmit2, FtsoSubmit1, FtsoSubmit2, SubmitSignatures},
	payload::ParsedPayloadMapper,
};

/// Submission state for one protocol within one voting round, generic over
/// each protocol's commit/reveal/signature payload kinds.
#[derive(Debug, Default)]
pub struct VotingRoundProtocol<S1, S2, SS> {
	pub submit_1: ParsedPayloadMapper<S1>,
	pub submit_2: ParsedPayloadMapper<S2>,
	pub submit_signatures: ParsedPayloadMapper<SS>,
	pub finalization: Option<ProtocolMessageRelayed>,
}

pub type FtsoVotingRoundProtocol = VotingRoundProtocol<FtsoSubmit1, FtsoSubmit2, SubmitSignatures>;

/// FDC has no commit phase; `submit_1` is tracked as an empty mapper purely
/// for shape symmetry with the FTSO side. Extends the base protocol state with the
/// round's attestation requests and the tallied consensus bitvote.
#[derive(Debug, Default)]
pub struct FdcVotingRoundProtocol {
	pub submit_1: ParsedPayloadMapper<()>,
	pub submit_2: ParsedPayloadMapper<FdcSubmit2>,
	pub submit_signatures: ParsedPayloadMapper<SubmitSignatures>,
	pub finalization: Option<ProtocolMessageRelayed>,
	pub requests: AttestationRequestMapper,
	/// Tally of how many `submitSignatures` calls carried each distinct
	/// `unsigned_message` bytes value — the consensus bitvote is the most
	/// commonly-signed payload.
	pub consensus_bitvote: HashMap<Vec<u8>, u32>,
}

/// Attestation requests observed during one voting epoch, used by the FDC
/// validator to compute the expected bitvote.
///
/// Requests are deduplicated on byte-identical `data`, first occurrence (by
/// `(block, log_index)` ascending) wins; `sorted()` then returns that list
/// **reversed**, the order the bitvote inflation procedure walks in.
#[derive(Debug, Default)]
pub struct AttestationRequestMapper {
	requests: Vec<AttestationRequest>,
}

impl AttestationRequestMapper {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, request: AttestationRequest) {
		if self.requests.iter().any(|r| r.data == request.data) {
			return;
		}
		let pos = self
			.requests
			.partition_point(|r| (r.block, r.log_index) < (request.block, request.log_index));
		self.requests.insert(pos, request);
	}

	/// Deduplicated requests in reverse on-chain order.
	pub fn sorted(&self) -> Vec<&AttestationRequest> {
		self.requests.iter().rev().collect()
	}

	pub fn len(&self) -> usize {
		self.requests.len()
	}

	pub fn is_empty(&self) -> bool {
		self.requests.is_empty()
	}
}

/// All state for one voting epoch, across both protocols.
#[derive(Debug, Default)]
pub struct VotingRound {
	pub ftso: FtsoVotingRoundProtocol,
	pub fdc: FdcVotingRoundProtocol,
	/// Raw signing-policy bytes this round's messages should have been
	/// signed under — frozen at round-creation time so a mid-round policy
	/// rollover can't retroactively change what a submission is judged
	/// against.
	pub signing_policy_bytes: Bytes,
}

impl VotingRound {
	pub fn new(signing_policy_bytes: Bytes) -> Self {
		Self { signing_policy_bytes, ..Default::default() }
	}
}

/// Owns every `VotingRound` still within the observation window, creating
/// them lazily on first reference and finalizing+evicting them once a full
/// voting-epoch grace period has elapsed.
#[derive(Debug)]
pub struct VotingRoundManager {
	voting_factory: VotingEpochFactory,
	finalized: u32,
	rounds: BTreeMap<u32, VotingRound>,
}

impl VotingRoundManager {
	pub fn new(voting_factory: VotingEpochFactory) -> Self {
		Self { voting_factory, finalized: 0, rounds: BTreeMap::new() }
	}

	/// Returns the round for `epoch`, creating an empty one under the given
	/// signing policy bytes if this is the first reference to it.
	pub fn get_or_create(&mut self, epoch: VotingEpoch, signing_policy_bytes: &Bytes) -> &mut VotingRound {
		self.rounds
			.entry(epoch.id)
			.or_insert_with(|| VotingRound::new(signing_policy_bytes.clone()))
	}

	pub fn get(&self, epoch: VotingEpoch) -> Option<&VotingRound> {
		self.rounds.get(&epoch.id)
	}

	pub fn get_mut(&mut self, epoch: VotingEpoch) -> Option<&mut VotingRound> {
		self.rounds.get_mut(&epoch.id)
	}

	/// Finalizes every round whose next epoch has fully ended as of
	/// `block_timestamp`, in ascending-id order : rounds at or
	/// before the last-finalized id are late GC'd silently; otherwise a round
	/// whose `next().end_s() < block_timestamp` is popped, `finalized`
	/// advances to at least its id, and it's returned together with its epoch
	/// for validation. No round is ever finalized twice.
	pub fn finalize(&mut self, block_timestamp: i64) -> Vec<(VotingEpoch, VotingRound)> {
		let ids: Vec<u32> = self.rounds.keys().copied().collect();
		let mut finalized_now = Vec::new();

		for id in ids {
			if id <= self.finalized {
				self.rounds.remove(&id);
				continue;
			}

			let epoch = self.voting_factory.epoch(id);
			if epoch.next().end_s() < block_timestamp {
				self.finalized = self.finalized.max(id);
				if let Some(round) = self.rounds.remove(&id) {
					finalized_now.push((epoch, round));
				}
			}
		}

		finalized_now
	}

	pub fn len(&self) -> usize {
		self.rounds.len()
	}
}

#[cfg(test)]
mod tests {
	use ethers::types::Address;

	use super::*;

	fn factory() -> VotingEpochFactory {
		VotingEpochFactory::default_mainnet()
	}

	fn epoch(id: u32) -> VotingEpoch {
		factory().epoch(id)
	}

	fn request(block: u64, log_index: u64, data: &[u8]) -> AttestationRequest {
		AttestationRequest { data: Bytes::from(data.to_vec()), block, log_index, voting_epoch_id: epoch(1) }
	}

	#[test]
	fn attestation_requests_sorted_is_reverse_of_first_occurrence_order() {
		let mut mapper = AttestationRequestMapper::new();
		mapper.insert(request(10, 1, b"b"));
		mapper.insert(request(9, 5, b"a"));
		mapper.insert(request(10, 0, b"c"));

		let order: Vec<_> = mapper.sorted().iter().map(|r| r.data.to_vec()).collect();
		// ascending (block, log_index) order is a, c, b; sorted() reverses it.
		assert_eq!(order, vec![b"b".to_vec(), b"c".to_vec(), b"a".to_vec()]);
	}

	#[test]
	fn duplicate_requests_collapse_to_first_occurrence() {
		let mut mapper = AttestationRequestMapper::new();
		mapper.insert(request(1, 0, b"x"));
		mapper.insert(request(2, 0, b"x"));
		assert_eq!(mapper.len(), 1);
	}

	#[test]
	fn manager_creates_rounds_lazily() {
		let mut manager = VotingRoundManager::new(factory());
		let policy_bytes = Bytes::from(vec![1, 2, 3]);

		manager.get_or_create(epoch(5), &policy_bytes);
		manager.get_or_create(epoch(6), &policy_bytes);
		assert_eq!(manager.len(), 2);
	}

	#[test]
	fn finalize_pops_rounds_whose_next_epoch_has_ended() {
		let mut manager = VotingRoundManager::new(factory());
		let policy_bytes = Bytes::default();
		manager.get_or_create(epoch(5), &policy_bytes);
		manager.get_or_create(epoch(6), &policy_bytes);

		// epoch(6).next().end_s() is still in the future relative to epoch(6)'s own end.
		let ts_after_epoch5_grace = epoch(5).next().end_s() + 1;
		let finalized = manager.finalize(ts_after_epoch5_grace);

		assert_eq!(finalized.len(), 1);
		assert_eq!(finalized[0].0.id, 5);
		assert!(manager.get(epoch(5)).is_none());
		assert!(manager.get(epoch(6)).is_some());
	}

	#[test]
	fn finalized_is_monotonic_and_no_round_finalizes_twice() {
		let mut manager = VotingRoundManager::new(factory());
		let policy_bytes = Bytes::default();
		manager.get_or_create(epoch(5), &policy_bytes);

		let ts = epoch(5).next().end_s() + 1;
		let first = manager.finalize(ts);
		assert_eq!(first.len(), 1);

		// Re-creating the same epoch id after it was finalized must not
		// resurrect it into a second finalize() result.
		manager.get_or_create(epoch(5), &policy_bytes);
		let second = manager.finalize(ts);
		assert!(second.is_empty());
	}

	#[test]
	fn round_protocol_tracks_submissions_per_identity() {
		let mut round = VotingRound::new(Bytes::default());
		let sender = Address::from_low_u64_be(1);

		round.ftso.submit_1.insert(
			crate::payload::WTxData {
				block: 1,
				tx_index: 0,
				timestamp: 100,
				from: sender,
				voting_epoch_id: epoch(1),
			},
			FtsoSubmit1 { commit_hash: [1u8; 32] },
		);
		round.ftso.submit_1.insert(
			crate::payload::WTxData {
				block: 2,
				tx_index: 0,
				timestamp: 200,
				from: sender,
				voting_epoch_id: epoch(1),
			},
			FtsoSubmit1 { commit_hash: [2u8; 32] },
		);

		assert_eq!(
			round.ftso.submit_1.extract_latest(&sender, 0, 1_000).unwrap().payload.commit_hash,
			[2u8; 32]
		);
	}
}
