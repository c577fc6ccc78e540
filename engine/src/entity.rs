//! Entity & SigningPolicy model.

use std::{collections::HashMap, sync::Arc};

use ethers::types::Address;

/// One FTSO data provider / FDC attestor node operated by an `Entity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
	pub node_id: String,
	pub weight: u128,
}

/// One registered voter, keyed by five distinct checksum addresses.
/// `public_key` is kept as the raw hex string the
/// `VoterRegistered` event carries it as — nothing in this pipeline needs to
/// decode it, only to display/forward it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
	pub identity: Address,
	pub submit: Address,
	pub submit_signatures: Address,
	pub signing_policy: Address,
	pub delegation: Address,

	pub public_key: String,
	pub nodes: Vec<Node>,

	pub delegation_fee_bips: u16,

	pub w_nat_weight: u128,
	pub w_nat_capped_weight: u128,
	/// `(capped_weight + stake_weight) ^ (3/4)`, computed upstream by the
	/// `FlareSystemsCalculator` contract and carried verbatim on
	/// `VoterRegistered`.
	pub registration_weight: u128,
	/// The weight this entity was assigned in `SigningPolicyInitialized`.
	pub normalized_weight: u16,
}

/// O(1) sender-address to `Entity` lookup regardless of which of an
/// entity's five role addresses signed the transaction.
///
/// Entities are reference-counted rather than cloned into each of the six
/// maps: an `Entity` can carry an arbitrarily long `nodes` list, and every
/// `SigningPolicy` snapshot is immutable once built, so sharing is both
/// cheaper and simpler than duplicating.
#[derive(Debug, Clone, Default)]
pub struct EntityMapper {
	pub by_identity: HashMap<Address, Arc<Entity>>,
	pub by_submit: HashMap<Address, Arc<Entity>>,
	pub by_submit_signatures: HashMap<Address, Arc<Entity>>,
	pub by_signing_policy: HashMap<Address, Arc<Entity>>,
	pub by_delegation: HashMap<Address, Arc<Entity>>,
	pub by_omni: HashMap<Address, Arc<Entity>>,
}

impl EntityMapper {
	pub fn insert(&mut self, entity: Entity) {
		let entity = Arc::new(entity);

		self.by_identity.insert(entity.identity, entity.clone());
		self.by_submit.insert(entity.submit, entity.clone());
		self.by_submit_signatures.insert(entity.submit_signatures, entity.clone());
		self.by_signing_policy.insert(entity.signing_policy, entity.clone());
		self.by_delegation.insert(entity.delegation, entity.clone());

		self.by_omni.insert(entity.identity, entity.clone());
		self.by_omni.insert(entity.submit, entity.clone());
		self.by_omni.insert(entity.submit_signatures, entity.clone());
		self.by_omni.insert(entity.signing_policy, entity.clone());
		self.by_omni.insert(entity.delegation, entity);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entity(seed: u8) -> Entity {
		Entity {
			identity: Address::from_low_u64_be(seed as u64),
			submit: Address::from_low_u64_be(seed as u64 + 100),
			submit_signatures: Address::from_low_u64_be(seed as u64 + 200),
			signing_policy: Address::from_low_u64_be(seed as u64 + 300),
			delegation: Address::from_low_u64_be(seed as u64 + 400),
			public_key: "0xabc".into(),
			nodes: vec![Node { node_id: "node-1".into(), weight: 10 }],
			delegation_fee_bips: 500,
			w_nat_weight: 1_000,
			w_nat_capped_weight: 900,
			registration_weight: 950,
			normalized_weight: 42,
		}
	}

	#[test]
	fn every_role_address_resolves_via_omni() {
		let e = entity(1);
		let mut mapper = EntityMapper::default();
		mapper.insert(e.clone());

		for addr in [e.identity, e.submit, e.submit_signatures, e.signing_policy, e.delegation] {
			assert_eq!(*mapper.by_omni.get(&addr).unwrap().as_ref(), e);
		}
	}

	#[test]
	fn role_specific_maps_only_contain_their_role() {
		let e = entity(2);
		let mut mapper = EntityMapper::default();
		mapper.insert(e.clone());

		assert!(mapper.by_identity.contains_key(&e.identity));
		assert!(!mapper.by_identity.contains_key(&e.submit));
	}

	#[test]
	fn unknown_address_is_absent() {
		let mapper = EntityMapper::default();
		assert!(mapper.by_omni.get(&Address::from_low_u64_be(0xdead)).is_none());
	}
}
