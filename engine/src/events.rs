//! Contract event types consumed by the signing-policy builder and the
//! ingestion loop.
//!
//! The `*Log` types derive `ethers::contract::EthEvent` so that
//! `ethers_contract`'s generated `decode_log`/topic-hash machinery does the
//! actual ABI decoding.
//! Where the domain model needs more than the raw on-chain fields (a
//! containing block's timestamp, a log's position for dedup ordering), a
//! plain domain struct wraps the decoded `*Log` plus that extra context.

use ethers::{
	contract::EthEvent,
	types::{Address, Bytes, U256},
};

use crate::epoch::VotingEpoch;

#[derive(Debug, Clone, EthEvent)]
#[ethevent(name = "RandomAcquisitionStarted", abi = "RandomAcquisitionStarted(uint24,uint256)")]
pub struct RandomAcquisitionStarted {
	#[ethevent(indexed)]
	pub reward_epoch_id: u32,
	pub timestamp: U256,
}

#[derive(Debug, Clone, EthEvent)]
#[ethevent(
	name = "VotePowerBlockSelected",
	abi = "VotePowerBlockSelected(uint24,uint256,uint256)"
)]
pub struct VotePowerBlockSelected {
	#[ethevent(indexed)]
	pub reward_epoch_id: u32,
	pub vote_power_block: U256,
	pub timestamp: U256,
}

#[derive(Debug, Clone, EthEvent)]
#[ethevent(
	name = "VoterRegistered",
	abi = "VoterRegistered(address,uint24,address,address,address,bytes,uint256)"
)]
pub struct VoterRegistered {
	#[ethevent(indexed)]
	pub voter: Address,
	#[ethevent(indexed)]
	pub reward_epoch_id: u32,
	pub signing_policy_address: Address,
	pub submit_address: Address,
	pub submit_signatures_address: Address,
	pub public_key: Bytes,
	pub registration_weight: U256,
}

#[derive(Debug, Clone, EthEvent)]
#[ethevent(
	name = "VoterRegistrationInfo",
	abi = "VoterRegistrationInfo(address,uint24,address,uint16,uint256,uint256,string[],uint256[])"
)]
pub struct VoterRegistrationInfo {
	#[ethevent(indexed)]
	pub voter: Address,
	#[ethevent(indexed)]
	pub reward_epoch_id: u32,
	pub delegation_address: Address,
	pub delegation_fee_bips: u16,
	pub w_nat_weight: U256,
	pub w_nat_capped_weight: U256,
	pub node_ids: Vec<String>,
	pub node_weights: Vec<U256>,
}

#[derive(Debug, Clone, EthEvent)]
#[ethevent(name = "VoterRemoved", abi = "VoterRemoved(address,uint24)")]
pub struct VoterRemoved {
	#[ethevent(indexed)]
	pub voter: Address,
	#[ethevent(indexed)]
	pub reward_epoch_id: u32,
}

#[derive(Debug, Clone, EthEvent)]
#[ethevent(
	name = "SigningPolicyInitialized",
	abi = "SigningPolicyInitialized(uint24,uint32,uint16,uint256,address[],uint16[],bytes,uint256)"
)]
pub struct SigningPolicyInitialized {
	#[ethevent(indexed)]
	pub reward_epoch_id: u32,
	pub start_voting_round_id: u32,
	pub threshold: u16,
	pub seed: U256,
	pub voters: Vec<Address>,
	pub weights: Vec<u16>,
	pub signing_policy_bytes: Bytes,
	pub timestamp: U256,
}

/// Raw decode of the Relay contract's finalization event. Enriched into
/// [`ProtocolMessageRelayed`] with the containing block's timestamp once
/// decoded, since signature-grace-period math needs it.
#[derive(Debug, Clone, EthEvent)]
#[ethevent(
	name = "ProtocolMessageRelayed",
	abi = "ProtocolMessageRelayed(uint8,uint32,bool,bytes32)"
)]
pub struct ProtocolMessageRelayedLog {
	#[ethevent(indexed)]
	pub protocol_id: u8,
	#[ethevent(indexed)]
	pub voting_round_id: u32,
	pub random_quality_score: bool,
	pub merkle_root: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessageRelayed {
	pub protocol_id: u8,
	pub voting_round_id: u32,
	pub random_quality_score: bool,
	pub merkle_root: [u8; 32],
	pub timestamp: i64,
}

impl ProtocolMessageRelayed {
	pub fn from_log(log: ProtocolMessageRelayedLog, block_timestamp: i64) -> Self {
		Self {
			protocol_id: log.protocol_id,
			voting_round_id: log.voting_round_id,
			random_quality_score: log.random_quality_score,
			merkle_root: log.merkle_root,
			timestamp: block_timestamp,
		}
	}

	/// The 32-byte message that signers sign over, per the Relay contract's
	/// message encoding: `keccak256(protocolId(1) || votingRoundId(4,BE) ||
	/// randomQualityScore(1) || merkleRoot(32))`.
	pub fn to_message(&self) -> [u8; 32] {
		let mut buf = Vec::with_capacity(1 + 4 + 1 + 32);
		buf.push(self.protocol_id);
		buf.extend_from_slice(&self.voting_round_id.to_be_bytes());
		buf.push(self.random_quality_score as u8);
		buf.extend_from_slice(&self.merkle_root);
		ethers::utils::keccak256(buf)
	}
}

/// Raw decode of the FdcHub contract's attestation-request event.
#[derive(Debug, Clone, EthEvent)]
#[ethevent(name = "AttestationRequest", abi = "AttestationRequest(bytes)")]
pub struct AttestationRequestLog {
	pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRequest {
	pub data: Bytes,
	pub block: u64,
	pub log_index: u64,
	pub voting_epoch_id: VotingEpoch,
}

impl AttestationRequest {
	pub fn from_log(
		log: AttestationRequestLog,
		block: u64,
		log_index: u64,
		voting_epoch_id: VotingEpoch,
	) -> Self {
		Self { data: log.data, block, log_index, voting_epoch_id }
	}

	/// `data`'s leading 32 bytes: the ASCII-padded attestation type, used only
	/// for citing a request in a validator's issue text.
	pub fn attestation_type_representation(&self) -> String {
		decode_bytes32_ascii(self.data.get(0..32))
	}

	/// `data`'s second 32 bytes: the ASCII-padded source id.
	pub fn source_id_representation(&self) -> String {
		decode_bytes32_ascii(self.data.get(32..64))
	}
}

fn decode_bytes32_ascii(bytes: Option<&[u8]>) -> String {
	match bytes {
		Some(b) => String::from_utf8_lossy(b).trim_end_matches('\0').to_string(),
		None => String::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn protocol_message_relayed_hash_is_deterministic() {
		let a = ProtocolMessageRelayed {
			protocol_id: 100,
			voting_round_id: 7,
			random_quality_score: true,
			merkle_root: [1u8; 32],
			timestamp: 0,
		};
		let b = a.clone();
		assert_eq!(a.to_message(), b.to_message());

		let mut c = a.clone();
		c.voting_round_id = 8;
		assert_ne!(a.to_message(), c.to_message());
	}
}
