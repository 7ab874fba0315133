use alloy::primitives::utils::parse_ether;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Context;
use key_custody::api::server;
use key_custody::{
    ChainBackend, ChainClient, CustodyConfig, EvmChainClient, FileShareStore, MemoryChain,
    WalletManager,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logger (set RUST_LOG=debug for verbose output, RUST_LOG=info for normal)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = CustodyConfig::from_env();
    let store = Arc::new(FileShareStore::new_with_base_dir(config.store_dir.clone()));
    log::info!("📁 Share store: {:?}", store.base_dir());

    match config.chain_backend {
        ChainBackend::Rpc => {
            let chain = EvmChainClient::new(
                &config.rpc_url,
                config.confirmation_poll,
                config.confirmation_max_attempts,
            )?;
            let operator = config
                .sponsor_signer()?
                .context("SPONSOR_PRIVATE_KEY is required for the rpc chain backend")?;
            run(config, store, Arc::new(chain), operator).await
        }
        ChainBackend::Memory => {
            log::warn!("⚠️  In-memory chain: balances and registrations are lost on exit");
            let chain = MemoryChain::new();
            let operator = match config.sponsor_signer()? {
                Some(signer) => signer,
                None => PrivateKeySigner::random(),
            };
            chain.credit(operator.address(), parse_ether("100")?);
            run(config, store, Arc::new(chain), operator).await
        }
    }
}

async fn run<C: ChainClient + 'static>(
    config: CustodyConfig,
    store: Arc<FileShareStore>,
    chain: Arc<C>,
    operator: PrivateKeySigner,
) -> anyhow::Result<()> {
    log::info!("⛽ Sponsor account: {}", operator.address());
    let manager = Arc::new(WalletManager::new(config, store, chain, operator));

    log::info!("Starting key custody server");
    server::start_server(manager).await
}
