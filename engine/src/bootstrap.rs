//! Bootstrap: locates the block range a reward
//! epoch's voter-registration window falls in, then replays every
//! signing-policy event in that range to reconstruct the epoch's
//! `SigningPolicy` before live ingestion begins.

use ethers::{
	contract::EthEvent,
	types::{Address, Filter},
};

use crate::{
	constants::{
		BLOCK_SEARCH_TOLERANCE_SECONDS, VOTER_REGISTRATION_WINDOW_END_OFFSET_SECONDS,
		VOTER_REGISTRATION_WINDOW_START_OFFSET_SECONDS,
	},
	epoch::RewardEpoch,
	events::{
		RandomAcquisitionStarted, SigningPolicyInitialized, VotePowerBlockSelected,
		VoterRegistered, VoterRegistrationInfo, VoterRemoved,
	},
	rpc::ChainRpc,
	signing_policy::{SigningPolicy, SigningPolicyBuilder, SigningPolicyError, SigningPolicyEvent},
};

/// Binary-searches block numbers for the one whose timestamp is within
/// [`BLOCK_SEARCH_TOLERANCE_SECONDS`] of `target_ts`. Assumes
/// block timestamps are monotonically non-decreasing, which holds for any
/// honest EVM chain.
pub async fn find_block_at_timestamp(
	rpc: &dyn ChainRpc,
	target_ts: i64,
	head: u64,
) -> anyhow::Result<u64> {
	let mut lo = 0u64;
	let mut hi = head;

	loop {
		let mid = lo + (hi - lo) / 2;
		let block = rpc
			.get_block(mid)
			.await?
			.ok_or_else(|| anyhow::anyhow!("block {mid} not found while searching for timestamp"))?;
		let block_ts = block.timestamp.as_u64() as i64;

		if (block_ts - target_ts).abs() <= BLOCK_SEARCH_TOLERANCE_SECONDS || lo >= hi {
			return Ok(mid);
		}

		if block_ts < target_ts {
			lo = mid + 1;
		} else {
			hi = mid.saturating_sub(1).max(lo);
			if hi == mid {
				return Ok(mid);
			}
		}
	}
}

/// The block range a reward epoch's voter-registration window (~2h30m to
/// ~1h before its start) falls within.
pub async fn find_voter_registration_blocks(
	rpc: &dyn ChainRpc,
	reward_epoch: RewardEpoch,
	head: u64,
) -> anyhow::Result<(u64, u64)> {
	let window_start_ts = reward_epoch.start_s() - VOTER_REGISTRATION_WINDOW_START_OFFSET_SECONDS;
	let window_end_ts = reward_epoch.start_s() - VOTER_REGISTRATION_WINDOW_END_OFFSET_SECONDS;

	let start_block = find_block_at_timestamp(rpc, window_start_ts, head).await?;
	let end_block = find_block_at_timestamp(rpc, window_end_ts, head).await?;

	Ok((start_block, end_block.max(start_block)))
}

/// The contract addresses whose logs carry signing-policy events, loaded
/// from configuration.
#[derive(Debug, Clone, Copy)]
pub struct SigningPolicyContracts {
	pub voter_registry: Address,
	pub flare_systems_manager: Address,
	pub flare_systems_calculator: Address,
	pub relay: Address,
}

/// Scans `[from_block, to_block]` for every signing-policy event and folds
/// them into a `SigningPolicyBuilder`, stopping early once
/// `SigningPolicyInitialized` terminates it.
pub async fn get_signing_policy_events(
	rpc: &dyn ChainRpc,
	contracts: SigningPolicyContracts,
	reward_epoch: RewardEpoch,
	from_block: u64,
	to_block: u64,
) -> anyhow::Result<Result<SigningPolicy, SigningPolicyError>> {
	let mut builder = SigningPolicyBuilder::default().for_epoch(reward_epoch);

	let filter = Filter::new()
		.address(vec![
			contracts.voter_registry,
			contracts.flare_systems_calculator,
			contracts.relay,
			contracts.flare_systems_manager,
		])
		.from_block(from_block)
		.to_block(to_block);
	let logs = rpc.get_logs(&filter).await?;

	for log in logs {
		let topic0 = match log.topics.first() {
			Some(t) => *t,
			None => continue,
		};
		let raw = ethers::abi::RawLog { topics: log.topics.clone(), data: log.data.to_vec() };

		let event = if topic0 == RandomAcquisitionStarted::signature() {
			RandomAcquisitionStarted::decode_log(&raw)
				.ok()
				.map(SigningPolicyEvent::RandomAcquisitionStarted)
		} else if topic0 == VotePowerBlockSelected::signature() {
			VotePowerBlockSelected::decode_log(&raw)
				.ok()
				.map(SigningPolicyEvent::VotePowerBlockSelected)
		} else if topic0 == VoterRegistered::signature() {
			VoterRegistered::decode_log(&raw).ok().map(SigningPolicyEvent::VoterRegistered)
		} else if topic0 == VoterRegistrationInfo::signature() {
			VoterRegistrationInfo::decode_log(&raw)
				.ok()
				.map(SigningPolicyEvent::VoterRegistrationInfo)
		} else if topic0 == VoterRemoved::signature() {
			VoterRemoved::decode_log(&raw).ok().map(SigningPolicyEvent::VoterRemoved)
		} else if topic0 == SigningPolicyInitialized::signature() {
			SigningPolicyInitialized::decode_log(&raw)
				.ok()
				.map(SigningPolicyEvent::SigningPolicyInitialized)
		} else {
			None
		};

		if let Some(event) = event {
			if let Err(e) = builder.add(event) {
				return Ok(Err(e));
			}
			if builder.is_terminated() {
				break;
			}
		}
	}

	Ok(builder.build())
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use ethers::types::{Block, U256, U64};

	use super::*;
	use crate::rpc::fake::FakeChainRpc;

	fn block_at(number: u64, timestamp: u64) -> Block<ethers::types::Transaction> {
		Block {
			number: Some(U64::from(number)),
			timestamp: U256::from(timestamp),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn converges_within_tolerance() {
		let rpc = FakeChainRpc {
			blocks: Mutex::new((0..=1000u64).map(|n| (n, block_at(n, 1_000_000 + n * 2))).collect()),
			logs: Mutex::new(vec![]),
			head: Mutex::new(1000),
		};

		let target_ts = 1_000_000 + 500 * 2;
		let found = find_block_at_timestamp(&rpc, target_ts, 1000).await.unwrap();
		let found_block = rpc.get_block(found).await.unwrap().unwrap();
		assert!((found_block.timestamp.as_u64() as i64 - target_ts).abs() <= BLOCK_SEARCH_TOLERANCE_SECONDS);
	}

	#[tokio::test]
	async fn registration_window_start_precedes_end() {
		let rpc = FakeChainRpc {
			blocks: Mutex::new((0..=10000u64).map(|n| (n, block_at(n, n))).collect()),
			logs: Mutex::new(vec![]),
			head: Mutex::new(10000),
		};

		let reward_epoch = crate::epoch::RewardEpochFactory::new(0, 302_400).epoch(1);
		let (start, end) = find_voter_registration_blocks(&rpc, reward_epoch, 10000).await.unwrap();
		assert!(start <= end);
	}
}
