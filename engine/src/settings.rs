//! Configuration loading: a layered `config::Config` + `File` +
//! `serde::Deserialize` approach, with `clap` CLI overrides for the options
//! worth setting per-invocation.

use std::path::PathBuf;

use clap::Parser;
use ethers::types::Address;
use serde::Deserialize;
use utilities::redact_endpoint_secret::SecretUrl;

#[derive(Debug, Clone, Deserialize)]
pub struct ContractAddresses {
	pub voter_registry: Address,
	pub flare_systems_manager: Address,
	pub flare_systems_calculator: Address,
	pub relay: Address,
	pub fdc_hub: Address,
	/// The `Submission` contract `submit1`/`submit2`/`submitSignatures` calls
	/// must be sent to.
	pub submission: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpochParameters {
	pub first_voting_epoch_start_s: i64,
	pub voting_epoch_duration_s: i64,
	pub first_reward_epoch_start_s: i64,
	pub reward_epoch_duration_s: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationSettings {
	pub discord_webhook_url: Option<String>,
	pub slack_webhook_url: Option<String>,
	pub telegram_bot_token: Option<String>,
	pub telegram_chat_id: Option<String>,
	pub generic_http_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
	pub rpc_endpoint: SecretUrl,
	/// The single voter identity this instance observes.
	pub identity_address: Address,
	pub contracts: ContractAddresses,
	pub epochs: EpochParameters,
	#[serde(default)]
	pub notifications: NotificationSettings,
	#[serde(default)]
	pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Text,
	Json,
}

impl Configuration {
	pub fn validate(&self) -> anyhow::Result<()> {
		if self.rpc_endpoint.as_ref().is_empty() {
			anyhow::bail!("rpc_endpoint must not be empty");
		}
		if self.epochs.voting_epoch_duration_s <= 0 {
			anyhow::bail!("voting_epoch_duration_s must be positive");
		}
		if self.epochs.reward_epoch_duration_s <= 0 {
			anyhow::bail!("reward_epoch_duration_s must be positive");
		}
		Ok(())
	}
}

/// CLI overrides layered on top of the TOML config file.
#[derive(Debug, Parser)]
#[command(name = "flare-observer", about = "Participation observer for the FTSO/FDC voting protocols")]
pub struct CliOptions {
	#[arg(long, env = "FLARE_OBSERVER_CONFIG", default_value = "config/default.toml")]
	pub config: PathBuf,

	#[arg(long, value_enum)]
	pub log_format: Option<CliLogFormat>,

	#[arg(long, env = "FLARE_OBSERVER_RPC_ENDPOINT")]
	pub rpc_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliLogFormat {
	Text,
	Json,
}

pub fn load(options: &CliOptions) -> anyhow::Result<Configuration> {
	let mut builder = config::Config::builder()
		.add_source(config::File::from(options.config.clone()).required(false))
		.add_source(config::Environment::with_prefix("FLARE_OBSERVER").separator("__"));

	if let Some(endpoint) = &options.rpc_endpoint {
		builder = builder.set_override("rpc_endpoint", endpoint.clone())?;
	}
	if let Some(format) = options.log_format {
		let value = match format {
			CliLogFormat::Text => "text",
			CliLogFormat::Json => "json",
		};
		builder = builder.set_override("log_format", value)?;
	}

	let settings: Configuration = builder.build()?.try_deserialize()?;
	settings.validate()?;
	Ok(settings)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_empty_rpc_endpoint() {
		let config = Configuration {
			rpc_endpoint: SecretUrl::new(""),
			identity_address: Address::zero(),
			contracts: ContractAddresses {
				voter_registry: Address::zero(),
				flare_systems_manager: Address::zero(),
				flare_systems_calculator: Address::zero(),
				relay: Address::zero(),
				fdc_hub: Address::zero(),
				submission: Address::zero(),
			},
			epochs: EpochParameters {
				first_voting_epoch_start_s: 0,
				voting_epoch_duration_s: 90,
				first_reward_epoch_start_s: 0,
				reward_epoch_duration_s: 302_400,
			},
			notifications: NotificationSettings::default(),
			log_format: LogFormat::Text,
		};
		assert!(config.validate().is_err());
	}
}
