//! The main block-ingestion loop : polls the
//! chain head, dispatches each new block's logs and transactions into the
//! live `SigningPolicy`/`VotingRoundManager` state, rolls the signing policy
//! over at its `start_voting_round`, and finalizes+validates rounds once
//! their grace period has elapsed, running both validators against the
//! single configured identity.

use std::sync::Arc;

use ethers::{
	contract::EthEvent,
	types::{Address, Block, Filter, Log, Transaction},
};

use crate::{
	bootstrap::SigningPolicyContracts,
	constants::{FDC_PROTOCOL_ID, FTSO_PROTOCOL_ID, HEAD_POLL_IDLE_INTERVAL},
	epoch::{RewardEpochFactory, VotingEpoch, VotingEpochFactory},
	events::{
		AttestationRequestLog, ProtocolMessageRelayedLog, RandomAcquisitionStarted,
		SigningPolicyInitialized, VotePowerBlockSelected, VoterRegistered, VoterRegistrationInfo,
		VoterRemoved,
	},
	events::{AttestationRequest, ProtocolMessageRelayed},
	message::{Message, MessageLevel},
	notification::IssueEmitter,
	parsers::{
		self, fdc_segment, ftso_segment, parse_fdc_submit2, parse_fdc_submit_signatures,
		parse_ftso_submit1, parse_ftso_submit2, parse_segments, parse_submit_signatures,
	},
	payload::WTxData,
	rpc::ChainRpc,
	signing_policy::{SigningPolicy, SigningPolicyBuilder, SigningPolicyEvent},
	validators::{fdc::validate_fdc_round, ftso::validate_ftso_round},
	voting_round::VotingRoundManager,
};

fn selector(signature: &str) -> [u8; 4] {
	let hash = ethers::utils::keccak256(signature.as_bytes());
	[hash[0], hash[1], hash[2], hash[3]]
}

pub struct IngestionLoop {
	rpc: Arc<dyn ChainRpc>,
	contracts: SigningPolicyContracts,
	fdc_hub: Address,
	submission: Address,
	identity_address: Address,
	voting_factory: VotingEpochFactory,
	#[allow(dead_code)]
	reward_factory: RewardEpochFactory,
	policy: SigningPolicy,
	next_policy_builder: SigningPolicyBuilder,
	rounds: VotingRoundManager,
	emitter: IssueEmitter,
	last_processed_block: u64,
}

impl IngestionLoop {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		rpc: Arc<dyn ChainRpc>,
		contracts: SigningPolicyContracts,
		fdc_hub: Address,
		submission: Address,
		identity_address: Address,
		voting_factory: VotingEpochFactory,
		reward_factory: RewardEpochFactory,
		policy: SigningPolicy,
		last_processed_block: u64,
		emitter: IssueEmitter,
	) -> Self {
		let next_reward_epoch = policy.reward_epoch.next();
		Self {
			rpc,
			contracts,
			fdc_hub,
			submission,
			identity_address,
			voting_factory,
			reward_factory,
			policy,
			next_policy_builder: SigningPolicyBuilder::default().for_epoch(next_reward_epoch),
			rounds: VotingRoundManager::new(voting_factory),
			emitter,
			last_processed_block,
		}
	}

	/// Runs forever: polls for new blocks, sleeping [`HEAD_POLL_IDLE_INTERVAL`]
	/// when the head hasn't advanced.
	pub async fn run(&mut self) -> anyhow::Result<()> {
		loop {
			let head = self.rpc.block_number().await?;
			if head <= self.last_processed_block {
				tokio::time::sleep(HEAD_POLL_IDLE_INTERVAL).await;
				continue;
			}

			for number in (self.last_processed_block + 1)..=head {
				self.process_block(number).await?;
				self.last_processed_block = number;
			}
		}
	}

	async fn process_block(&mut self, number: u64) -> anyhow::Result<()> {
		let block = self
			.rpc
			.get_block_with_txs(number)
			.await?
			.ok_or_else(|| anyhow::anyhow!("block {number} disappeared between head and fetch"))?;

		let filter = Filter::new()
			.address(vec![
				self.contracts.voter_registry,
				self.contracts.flare_systems_manager,
				self.contracts.flare_systems_calculator,
				self.contracts.relay,
				self.fdc_hub,
			])
			.from_block(number)
			.to_block(number);
		let logs = self.rpc.get_logs(&filter).await?;

		let block_ts = block.timestamp.as_u64() as i64;
		let voting_epoch = self.voting_factory.from_timestamp(block_ts);

		self.maybe_roll_policy(voting_epoch)?;
		self.dispatch_logs(logs, block_ts, voting_epoch)?;
		self.dispatch_transactions(&block, block_ts, voting_epoch)?;
		self.finalize_ready_rounds(block_ts).await;

		Ok(())
	}

	fn dispatch_logs(&mut self, logs: Vec<Log>, block_ts: i64, voting_epoch: VotingEpoch) -> anyhow::Result<()> {
		for (log_index, log) in logs.into_iter().enumerate() {
			let topic0 = match log.topics.first() {
				Some(t) => *t,
				None => continue,
			};
			let raw = ethers::abi::RawLog { topics: log.topics.clone(), data: log.data.to_vec() };
			let block_number = log.block_number.map(|n| n.as_u64()).unwrap_or_default();

			if topic0 == ProtocolMessageRelayedLog::signature() {
				if let Ok(decoded) = ProtocolMessageRelayedLog::decode_log(&raw) {
					let relayed = ProtocolMessageRelayed::from_log(decoded, block_ts);
					let epoch = self.voting_factory.epoch(relayed.voting_round_id);
					let round = self.rounds.get_or_create(epoch, &self.policy.signing_policy_bytes);
					if relayed.protocol_id == FTSO_PROTOCOL_ID {
						round.ftso.finalization = Some(relayed);
					} else if relayed.protocol_id == FDC_PROTOCOL_ID {
						round.fdc.finalization = Some(relayed);
					}
				}
				continue;
			}

			if topic0 == AttestationRequestLog::signature() {
				if let Ok(decoded) = AttestationRequestLog::decode_log(&raw) {
					let request = AttestationRequest::from_log(decoded, block_number, log_index as u64, voting_epoch);
					let round = self.rounds.get_or_create(voting_epoch, &self.policy.signing_policy_bytes);
					round.fdc.requests.insert(request);
				}
				continue;
			}

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
				// A stray event for an epoch this builder isn't tracking
				// (reward_epoch_id mismatch) just fails this one `add` and is
				// dropped — it belongs to a builder already folded or not yet
				// started.
				let _ = self.next_policy_builder.add(event);
			}
		}
		Ok(())
	}

	fn dispatch_transactions(
		&mut self,
		block: &Block<Transaction>,
		block_ts: i64,
		voting_epoch: VotingEpoch,
	) -> anyhow::Result<()> {
		let submit1_selector = selector("submit1()");
		let submit2_selector = selector("submit2()");
		let submit_signatures_selector = selector("submitSignatures()");

		for (tx_index, tx) in block.transactions.iter().enumerate() {
			if tx.to != Some(self.submission) {
				continue;
			}
			if tx.input.len() < 4 {
				continue;
			}
			let tx_selector = [tx.input[0], tx.input[1], tx.input[2], tx.input[3]];
			let body = &tx.input[4..];

			// Resolve the sender through whichever of its five role addresses
			// signed this transaction, then key every mapper insertion on the
			// entity's identity address instead of the raw sending address, so a
			// submission sent from a non-canonical role address still lands in
			// the bucket a validator looks it up by.
			let entity = match self.policy.entity_mapper.by_omni.get(&tx.from) {
				Some(entity) => entity.clone(),
				None => continue,
			};

			let tx_data = WTxData {
				block: block.number.map(|n| n.as_u64()).unwrap_or_default(),
				tx_index: tx_index as u64,
				timestamp: block_ts,
				from: entity.identity,
				voting_epoch_id: voting_epoch,
			};

			let segments = match parse_segments(body) {
				Ok(s) => s,
				Err(_) => continue,
			};

			if tx_selector == submit1_selector {
				if let Some(seg) = ftso_segment(&segments) {
					let epoch = self.voting_factory.epoch(seg.voting_round_id);
					if let Ok(parsed) = parse_ftso_submit1(&seg.payload) {
						let round = self.rounds.get_or_create(epoch, &self.policy.signing_policy_bytes);
						round.ftso.submit_1.insert(tx_data, parsed);
					}
				}
			} else if tx_selector == submit2_selector {
				if let Some(seg) = ftso_segment(&segments) {
					let epoch = self.voting_factory.epoch(seg.voting_round_id);
					if let Ok(parsed) = parse_ftso_submit2(&seg.payload) {
						let round = self.rounds.get_or_create(epoch, &self.policy.signing_policy_bytes);
						round.ftso.submit_2.insert(tx_data, parsed);
					}
				}
				if let Some(seg) = fdc_segment(&segments) {
					let epoch = self.voting_factory.epoch(seg.voting_round_id);
					if let Ok(parsed) = parse_fdc_submit2(&seg.payload) {
						let round = self.rounds.get_or_create(epoch, &self.policy.signing_policy_bytes);
						round.fdc.submit_2.insert(tx_data, parsed);
					}
				}
			} else if tx_selector == submit_signatures_selector {
				if let Some(seg) = ftso_segment(&segments) {
					let epoch = self.voting_factory.epoch(seg.voting_round_id);
					if let Ok(parsed) = parse_submit_signatures(&seg.payload) {
						let round = self.rounds.get_or_create(epoch, &self.policy.signing_policy_bytes);
						round.ftso.submit_signatures.insert(tx_data, parsed);
					}
				}
				if let Some(seg) = fdc_segment(&segments) {
					let epoch = self.voting_factory.epoch(seg.voting_round_id);
					if let Ok(parsed) = parse_fdc_submit_signatures(&seg.payload) {
						let round = self.rounds.get_or_create(epoch, &self.policy.signing_policy_bytes);
						round
							.fdc
							.submit_signatures
							.insert(tx_data, parsers::SubmitSignatures { signature: parsed.signature.clone() });
						*round.fdc.consensus_bitvote.entry(parsed.unsigned_message).or_insert(0) += 1;
					}
				}
			}
		}
		Ok(())
	}

	/// Rolls the live `SigningPolicy` over once the current voting epoch
	/// reaches the next policy's `start_voting_round`. The next policy's own
	/// builder keeps accumulating even after rollover, for the reward epoch
	/// after that.
	fn maybe_roll_policy(&mut self, voting_epoch: VotingEpoch) -> anyhow::Result<()> {
		if !self.next_policy_builder.is_terminated() {
			return Ok(());
		}
		let start_voting_round =
			self.next_policy_builder.signing_policy_initialized.as_ref().unwrap().start_voting_round_id;
		if voting_epoch.id < start_voting_round {
			return Ok(());
		}

		let next_reward_epoch = self.policy.reward_epoch.next();
		let builder = std::mem::replace(
			&mut self.next_policy_builder,
			SigningPolicyBuilder::default().for_epoch(next_reward_epoch.next()),
		);
		match builder.build() {
			Ok(new_policy) => {
				tracing::info!(reward_epoch = new_policy.reward_epoch.id, "rolled over signing policy");
				self.policy = new_policy;
			},
			Err(e) => {
				tracing::error!(%e, "signing policy rollover failed; keeping previous policy active");
			},
		}
		Ok(())
	}

	/// Finalizes every round whose grace period has elapsed and validates
	/// each against the monitored identity. A round is skipped entirely if
	/// the configured identity isn't registered under the signing policy it
	/// was observed under — nothing to validate.
	async fn finalize_ready_rounds(&mut self, block_ts: i64) {
		for (epoch, round) in self.rounds.finalize(block_ts) {
			let identity = match self.policy.entity_mapper.by_identity.get(&self.identity_address) {
				Some(entity) => entity.clone(),
				None => {
					tracing::warn!(
						voting_round = epoch.id,
						identity = ?self.identity_address,
						"monitored identity not registered under the current signing policy; skipping round"
					);
					continue;
				},
			};

			let mut messages = validate_ftso_round(&round, &identity, epoch);
			match validate_fdc_round(&round, &identity, epoch) {
				Ok(fdc_messages) => messages.extend(fdc_messages),
				Err(e) => {
					messages.push(
						Message::builder(MessageLevel::Critical, FDC_PROTOCOL_ID, epoch)
							.entity(identity.identity)
							.text(format!("FDC bitvote validation aborted: {e}"))
							.build(),
					);
				},
			}

			for message in &messages {
				self.emitter.emit(message).await;
			}
		}
	}
}
