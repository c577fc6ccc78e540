//! Chain RPC client. A trait at the boundary so the ingestion loop and
//! bootstrap scan can be driven by a fake in tests.

use async_trait::async_trait;
use ethers::{
	providers::{Http, Middleware, Provider},
	types::{Block, BlockNumber, Filter, Log, Transaction, TxHash, U64},
};
use utilities::redact_endpoint_secret::SecretUrl;

#[async_trait]
pub trait ChainRpc: Send + Sync {
	async fn block_number(&self) -> anyhow::Result<u64>;

	async fn get_block(&self, number: u64) -> anyhow::Result<Option<Block<TxHash>>>;

	async fn get_block_with_txs(&self, number: u64) -> anyhow::Result<Option<Block<Transaction>>>;

	async fn get_logs(&self, filter: &Filter) -> anyhow::Result<Vec<Log>>;
}

/// `ChainRpc` over `ethers::providers::Provider<Http>`. No PoA extraData
/// middleware is layered in — Flare is non-PoA from the client's
/// perspective, unlike the BSC/Polygon-style chains that kind of middleware
/// exists for (a deliberate simplification, noted in DESIGN.md).
pub struct EthersChainRpc {
	provider: Provider<Http>,
}

impl EthersChainRpc {
	pub fn new(endpoint: &SecretUrl) -> anyhow::Result<Self> {
		let provider = Provider::<Http>::try_from(endpoint.as_ref())
			.map_err(|e| anyhow::anyhow!("failed to build http provider for {endpoint:?}: {e}"))?;
		Ok(Self { provider })
	}
}

#[async_trait]
impl ChainRpc for EthersChainRpc {
	async fn block_number(&self) -> anyhow::Result<u64> {
		Ok(self.provider.get_block_number().await?.as_u64())
	}

	async fn get_block(&self, number: u64) -> anyhow::Result<Option<Block<TxHash>>> {
		Ok(self.provider.get_block(BlockNumber::Number(U64::from(number))).await?)
	}

	async fn get_block_with_txs(&self, number: u64) -> anyhow::Result<Option<Block<Transaction>>> {
		Ok(self.provider.get_block_with_txs(BlockNumber::Number(U64::from(number))).await?)
	}

	async fn get_logs(&self, filter: &Filter) -> anyhow::Result<Vec<Log>> {
		Ok(self.provider.get_logs(filter).await?)
	}
}
