//! Signing-policy reconstruction and the
//! immutable `SigningPolicy` snapshot it produces.

use std::collections::HashMap;

use ethers::types::{Address, Bytes, U256};
use thiserror::Error;

use crate::{
	entity::{Entity, EntityMapper, Node},
	epoch::RewardEpoch,
	events::{
		RandomAcquisitionStarted, SigningPolicyInitialized, VotePowerBlockSelected,
		VoterRegistered, VoterRegistrationInfo, VoterRemoved,
	},
};

/// Immutable snapshot of the registered voter set for one reward epoch.
/// Replaced atomically on the voting epoch that matches `start_voting_round`.
#[derive(Debug, Clone)]
pub struct SigningPolicy {
	pub reward_epoch: RewardEpoch,
	pub vote_power_block: u64,
	pub start_voting_round: u32,
	pub threshold: u16,
	pub seed: U256,
	pub signing_policy_bytes: Bytes,
	pub entities: Vec<Entity>,
	pub entity_mapper: EntityMapper,
}

impl SigningPolicy {
	pub fn builder() -> SigningPolicyBuilder {
		SigningPolicyBuilder::default()
	}
}

/// One of the six event kinds the builder folds into a `SigningPolicy`.
#[derive(Debug, Clone)]
pub enum SigningPolicyEvent {
	RandomAcquisitionStarted(RandomAcquisitionStarted),
	VotePowerBlockSelected(VotePowerBlockSelected),
	VoterRegistered(VoterRegistered),
	VoterRegistrationInfo(VoterRegistrationInfo),
	VoterRemoved(VoterRemoved),
	SigningPolicyInitialized(SigningPolicyInitialized),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningPolicyError {
	#[error("RandomAcquisitionStarted already set for this reward epoch")]
	RandomAcquisitionStartedAlreadySet,
	#[error("VotePowerBlockSelected already set for this reward epoch")]
	VotePowerBlockSelectedAlreadySet,
	#[error("SigningPolicyInitialized already set for this reward epoch")]
	SigningPolicyInitializedAlreadySet,
	#[error("missing RandomAcquisitionStarted event")]
	MissingRandomAcquisitionStarted,
	#[error("missing VotePowerBlockSelected event")]
	MissingVotePowerBlockSelected,
	#[error("missing SigningPolicyInitialized event")]
	MissingSigningPolicyInitialized,
	#[error("reward_epoch_id mismatch: builder is for {expected} but event carries {actual}")]
	RewardEpochIdMismatch { expected: u32, actual: u32 },
	#[error(
		"voter_registered ({registered}) and voter_registration_info ({info}) counts don't match"
	)]
	RegistrationCountMismatch { registered: usize, info: usize },
	#[error("no VoterRegistered event for signing policy address {0:?}")]
	UnknownSigningPolicyAddress(Address),
	#[error("no VoterRegistrationInfo event for voter {0:?}")]
	MissingRegistrationInfo(Address),
}

/// Event-driven builder that accumulates one reward epoch's registration
/// window and folds it into a `SigningPolicy`.
#[derive(Debug, Clone)]
pub struct SigningPolicyBuilder {
	reward_epoch: Option<RewardEpoch>,

	random_acquisition_started: Option<RandomAcquisitionStarted>,
	vote_power_block_selected: Option<VotePowerBlockSelected>,

	voter_registered: Vec<VoterRegistered>,
	voter_registration_info: Vec<VoterRegistrationInfo>,
	voter_removed: Vec<VoterRemoved>,

	pub signing_policy_initialized: Option<SigningPolicyInitialized>,
}

impl Default for SigningPolicyBuilder {
	fn default() -> Self {
		Self {
			reward_epoch: None,
			random_acquisition_started: None,
			vote_power_block_selected: None,
			voter_registered: Vec::new(),
			voter_registration_info: Vec::new(),
			voter_removed: Vec::new(),
			signing_policy_initialized: None,
		}
	}
}

impl SigningPolicyBuilder {
	pub fn for_epoch(mut self, reward_epoch: RewardEpoch) -> Self {
		self.reward_epoch = Some(reward_epoch);
		self
	}

	pub fn add(&mut self, event: SigningPolicyEvent) -> Result<(), SigningPolicyError> {
		match event {
			SigningPolicyEvent::RandomAcquisitionStarted(e) => {
				if self.random_acquisition_started.is_some() {
					return Err(SigningPolicyError::RandomAcquisitionStartedAlreadySet);
				}
				self.random_acquisition_started = Some(e);
			},
			SigningPolicyEvent::VotePowerBlockSelected(e) => {
				if self.vote_power_block_selected.is_some() {
					return Err(SigningPolicyError::VotePowerBlockSelectedAlreadySet);
				}
				self.vote_power_block_selected = Some(e);
			},
			SigningPolicyEvent::VoterRegistered(e) => self.voter_registered.push(e),
			SigningPolicyEvent::VoterRegistrationInfo(e) => self.voter_registration_info.push(e),
			SigningPolicyEvent::VoterRemoved(e) => self.voter_removed.push(e),
			SigningPolicyEvent::SigningPolicyInitialized(e) => {
				if self.signing_policy_initialized.is_some() {
					return Err(SigningPolicyError::SigningPolicyInitializedAlreadySet);
				}
				self.signing_policy_initialized = Some(e);
			},
		}
		Ok(())
	}

	/// `true` once the terminal event has been folded in; historical scans
	/// stop processing further logs at this point.
	pub fn is_terminated(&self) -> bool {
		self.signing_policy_initialized.is_some()
	}

	pub fn build(self) -> Result<SigningPolicy, SigningPolicyError> {
		let reward_epoch = self.reward_epoch.expect("builder always constructed `for_epoch`");
		let rid = reward_epoch.id;

		let ras = self
			.random_acquisition_started
			.ok_or(SigningPolicyError::MissingRandomAcquisitionStarted)?;
		if ras.reward_epoch_id != rid {
			return Err(SigningPolicyError::RewardEpochIdMismatch {
				expected: rid,
				actual: ras.reward_epoch_id,
			});
		}

		let vpbs = self
			.vote_power_block_selected
			.ok_or(SigningPolicyError::MissingVotePowerBlockSelected)?;
		if vpbs.reward_epoch_id != rid {
			return Err(SigningPolicyError::RewardEpochIdMismatch {
				expected: rid,
				actual: vpbs.reward_epoch_id,
			});
		}

		let spi = self
			.signing_policy_initialized
			.ok_or(SigningPolicyError::MissingSigningPolicyInitialized)?;
		if spi.reward_epoch_id != rid {
			return Err(SigningPolicyError::RewardEpochIdMismatch {
				expected: rid,
				actual: spi.reward_epoch_id,
			});
		}

		if self.voter_registered.len() != self.voter_registration_info.len() {
			return Err(SigningPolicyError::RegistrationCountMismatch {
				registered: self.voter_registered.len(),
				info: self.voter_registration_info.len(),
			});
		}

		// index: signing_policy_address -> identity voter address
		let signing_policy_address_to_voter: HashMap<Address, Address> = self
			.voter_registered
			.iter()
			.map(|v| (v.signing_policy_address, v.voter))
			.collect();
		let registered_by_voter: HashMap<Address, &VoterRegistered> =
			self.voter_registered.iter().map(|v| (v.voter, v)).collect();
		let info_by_voter: HashMap<Address, &VoterRegistrationInfo> =
			self.voter_registration_info.iter().map(|v| (v.voter, v)).collect();

		let mut entities = Vec::with_capacity(spi.voters.len());
		let mut mapper = EntityMapper::default();

		for (i, signing_policy_address) in spi.voters.iter().enumerate() {
			let weight = spi.weights[i];

			let voter = *signing_policy_address_to_voter
				.get(signing_policy_address)
				.ok_or(SigningPolicyError::UnknownSigningPolicyAddress(*signing_policy_address))?;

			let registered = *registered_by_voter
				.get(&voter)
				.ok_or(SigningPolicyError::UnknownSigningPolicyAddress(*signing_policy_address))?;
			let info = *info_by_voter
				.get(&voter)
				.ok_or(SigningPolicyError::MissingRegistrationInfo(voter))?;

			let nodes = info
				.node_ids
				.iter()
				.zip(info.node_weights.iter())
				.map(|(id, w)| Node { node_id: id.clone(), weight: w.as_u128() })
				.collect();

			entities.push(Entity {
				identity: registered.voter,
				submit: registered.submit_address,
				submit_signatures: registered.submit_signatures_address,
				signing_policy: registered.signing_policy_address,
				delegation: info.delegation_address,
				public_key: format!("0x{}", hex::encode(&registered.public_key)),
				nodes,
				delegation_fee_bips: info.delegation_fee_bips,
				w_nat_weight: info.w_nat_weight.as_u128(),
				w_nat_capped_weight: info.w_nat_capped_weight.as_u128(),
				registration_weight: registered.registration_weight.as_u128(),
				normalized_weight: weight,
			});
		}

		for entity in &entities {
			mapper.insert(entity.clone());
		}

		Ok(SigningPolicy {
			reward_epoch,
			vote_power_block: vpbs.vote_power_block.as_u64(),
			start_voting_round: spi.start_voting_round_id,
			threshold: spi.threshold,
			seed: spi.seed,
			signing_policy_bytes: spi.signing_policy_bytes,
			entities,
			entity_mapper: mapper,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::epoch::RewardEpochFactory;

	fn addr(x: u64) -> Address {
		Address::from_low_u64_be(x)
	}

	fn populated_builder(reward_epoch: RewardEpoch) -> SigningPolicyBuilder {
		let mut b = SigningPolicyBuilder::default().for_epoch(reward_epoch);

		b.add(SigningPolicyEvent::RandomAcquisitionStarted(RandomAcquisitionStarted {
			reward_epoch_id: reward_epoch.id,
			timestamp: 100.into(),
		}))
		.unwrap();
		b.add(SigningPolicyEvent::VotePowerBlockSelected(VotePowerBlockSelected {
			reward_epoch_id: reward_epoch.id,
			vote_power_block: 12345.into(),
			timestamp: 200.into(),
		}))
		.unwrap();

		b.add(SigningPolicyEvent::VoterRegistered(VoterRegistered {
			voter: addr(1),
			reward_epoch_id: reward_epoch.id,
			signing_policy_address: addr(11),
			submit_address: addr(21),
			submit_signatures_address: addr(31),
			public_key: Bytes::from(vec![0xaa, 0xbb]),
			registration_weight: 500.into(),
		}))
		.unwrap();
		b.add(SigningPolicyEvent::VoterRegistrationInfo(VoterRegistrationInfo {
			voter: addr(1),
			reward_epoch_id: reward_epoch.id,
			delegation_address: addr(41),
			delegation_fee_bips: 200,
			w_nat_weight: 1000.into(),
			w_nat_capped_weight: 900.into(),
			node_ids: vec!["node-a".into()],
			node_weights: vec![77.into()],
		}))
		.unwrap();

		b.add(SigningPolicyEvent::SigningPolicyInitialized(SigningPolicyInitialized {
			reward_epoch_id: reward_epoch.id,
			start_voting_round_id: 500,
			threshold: 5000,
			seed: U256::zero(),
			voters: vec![addr(11)],
			weights: vec![999],
			signing_policy_bytes: Bytes::from(vec![1, 2, 3]),
			timestamp: 300.into(),
		}))
		.unwrap();

		b
	}

	#[test]
	fn builds_entity_in_voters_order_with_normalized_weight() {
		let reward_epoch = RewardEpochFactory::default_mainnet().epoch(9);
		let policy = populated_builder(reward_epoch).build().unwrap();

		assert_eq!(policy.entities.len(), 1);
		assert_eq!(policy.entities[0].identity, addr(1));
		assert_eq!(policy.entities[0].normalized_weight, 999);
		assert_eq!(policy.entities[0].nodes, vec![Node { node_id: "node-a".into(), weight: 77 }]);
	}

	#[test]
	fn every_entity_resolves_via_omni_mapper() {
		let reward_epoch = RewardEpochFactory::default_mainnet().epoch(9);
		let policy = populated_builder(reward_epoch).build().unwrap();
		let e = &policy.entities[0];

		for addr in [e.identity, e.submit, e.submit_signatures, e.signing_policy, e.delegation] {
			assert_eq!(policy.entity_mapper.by_omni.get(&addr).unwrap().identity, e.identity);
		}
	}

	#[test]
	fn rejects_duplicate_random_acquisition_started() {
		let reward_epoch = RewardEpochFactory::default_mainnet().epoch(1);
		let mut b = SigningPolicyBuilder::default().for_epoch(reward_epoch);
		b.add(SigningPolicyEvent::RandomAcquisitionStarted(RandomAcquisitionStarted {
			reward_epoch_id: 1,
			timestamp: 1.into(),
		}))
		.unwrap();

		let err = b
			.add(SigningPolicyEvent::RandomAcquisitionStarted(RandomAcquisitionStarted {
				reward_epoch_id: 1,
				timestamp: 2.into(),
			}))
			.unwrap_err();
		assert_eq!(err, SigningPolicyError::RandomAcquisitionStartedAlreadySet);
	}

	#[test]
	fn build_fails_fast_when_singleton_missing() {
		let reward_epoch = RewardEpochFactory::default_mainnet().epoch(1);
		let b = SigningPolicyBuilder::default().for_epoch(reward_epoch);
		assert_eq!(b.build().unwrap_err(), SigningPolicyError::MissingRandomAcquisitionStarted);
	}

	#[test]
	fn build_fails_on_registration_count_mismatch() {
		let reward_epoch = RewardEpochFactory::default_mainnet().epoch(1);
		let mut b = populated_builder(reward_epoch);
		b.voter_registration_info.clear();
		assert_eq!(
			b.build().unwrap_err(),
			SigningPolicyError::RegistrationCountMismatch { registered: 1, info: 0 }
		);
	}

	#[test]
	fn is_terminated_tracks_signing_policy_initialized() {
		let reward_epoch = RewardEpochFactory::default_mainnet().epoch(1);
		let mut b = SigningPolicyBuilder::default().for_epoch(reward_epoch);
		assert!(!b.is_terminated());
		b.add(SigningPolicyEvent::SigningPolicyInitialized(SigningPolicyInitialized {
			reward_epoch_id: 1,
			start_voting_round_id: 0,
			threshold: 0,
			seed: U256::zero(),
			voters: vec![],
			weights: vec![],
			signing_policy_bytes: Bytes::default(),
			timestamp: 0.into(),
		}))
		.unwrap();
		assert!(b.is_terminated());
	}
}
