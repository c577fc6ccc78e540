//! Binary entrypoint: parses CLI args, loads configuration, builds the RPC
//! client, wires the configured notification sinks, runs bootstrap, then
//! runs the ingestion loop forever.

use std::sync::Arc;

use clap::Parser;
use flare_observer_engine::{
	bootstrap::{find_voter_registration_blocks, get_signing_policy_events, SigningPolicyContracts},
	epoch::{RewardEpochFactory, VotingEpochFactory},
	ingestion::IngestionLoop,
	notification::{
		discord::DiscordSink, generic::GenericHttpSink, slack::SlackSink, telegram::TelegramSink,
		tracing_sink::TracingSink, IssueEmitter, NotificationSink,
	},
	rpc::{ChainRpc, EthersChainRpc},
	settings::{self, CliOptions, Configuration},
};

/// Exit codes documented for the observer: `0` clean shutdown
/// (never reached under normal operation — the loop runs forever), `1`
/// configuration error, `2` unrecoverable RPC failure.
const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_RPC_FAILURE: i32 = 2;

#[tokio::main]
async fn main() {
	let options = CliOptions::parse();
	init_tracing(&options);

	let config = match settings::load(&options) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("configuration error: {e:#}");
			std::process::exit(EXIT_CONFIG_ERROR);
		},
	};

	if let Err(e) = run(config).await {
		tracing::error!(error = %e, "ingestion loop terminated");
		std::process::exit(EXIT_RPC_FAILURE);
	}
}

fn init_tracing(options: &CliOptions) {
	let format = options.log_format.map(|f| matches!(f, settings::CliLogFormat::Json)).unwrap_or(false);
	let subscriber = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
	if format {
		subscriber.json().init();
	} else {
		subscriber.init();
	}
}

fn build_sinks(config: &Configuration) -> Vec<Box<dyn NotificationSink>> {
	let mut sinks: Vec<Box<dyn NotificationSink>> = vec![Box::new(TracingSink)];

	if let Some(url) = &config.notifications.discord_webhook_url {
		sinks.push(Box::new(DiscordSink::new(url.clone())));
	}
	if let Some(url) = &config.notifications.slack_webhook_url {
		sinks.push(Box::new(SlackSink::new(url.clone())));
	}
	if let (Some(token), Some(chat_id)) =
		(&config.notifications.telegram_bot_token, &config.notifications.telegram_chat_id)
	{
		sinks.push(Box::new(TelegramSink::new(token.clone(), chat_id.clone())));
	}
	if let Some(endpoint) = &config.notifications.generic_http_endpoint {
		sinks.push(Box::new(GenericHttpSink::new(endpoint.clone())));
	}

	sinks
}

async fn run(config: Configuration) -> anyhow::Result<()> {
	let rpc: Arc<dyn ChainRpc> = Arc::new(EthersChainRpc::new(&config.rpc_endpoint)?);

	let voting_factory = VotingEpochFactory::new(
		config.epochs.first_voting_epoch_start_s,
		config.epochs.voting_epoch_duration_s,
	);
	let reward_factory = RewardEpochFactory::new(
		config.epochs.first_reward_epoch_start_s,
		config.epochs.reward_epoch_duration_s,
	);

	let contracts = SigningPolicyContracts {
		voter_registry: config.contracts.voter_registry,
		flare_systems_manager: config.contracts.flare_systems_manager,
		flare_systems_calculator: config.contracts.flare_systems_calculator,
		relay: config.contracts.relay,
	};

	let head = rpc.block_number().await?;
	let head_block = rpc
		.get_block(head)
		.await?
		.ok_or_else(|| anyhow::anyhow!("chain head block {head} unavailable"))?;
	let current_reward_epoch = reward_factory.from_timestamp(head_block.timestamp.as_u64() as i64);

	let (start_block, end_block) =
		find_voter_registration_blocks(rpc.as_ref(), current_reward_epoch, head).await?;
	let policy =
		get_signing_policy_events(rpc.as_ref(), contracts, current_reward_epoch, start_block, end_block)
			.await?
			.map_err(|e| anyhow::anyhow!("failed to reconstruct signing policy: {e}"))?;

	tracing::info!(
		reward_epoch = policy.reward_epoch.id,
		entities = policy.entities.len(),
		"bootstrapped signing policy"
	);

	let emitter = IssueEmitter::new(build_sinks(&config));

	let mut loop_ = IngestionLoop::new(
		rpc,
		contracts,
		config.contracts.fdc_hub,
		config.contracts.submission,
		config.identity_address,
		voting_factory,
		reward_factory,
		policy,
		head,
		emitter,
	);

	loop_.run().await
}
