use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::{sync::Arc, time::Duration};
use veil_common::{block::BlockComplete, crypto::CompressedPublicKey, transaction::Transaction};
use veil_daemon::{
    core::{
        blockchain::{Blockchain, ChainConfig},
        forging::{CreateForgingTransactions, Forging, ForgingConfig, StakingAccount},
        mempool::Mempool,
        storage::{MemoryStore, SledStore, Store},
        verifier::StructuralVerifier,
    },
    rpc::{
        delegator::{DelegatorConfig, DelegatorNode},
        RpcHandler,
    },
};

#[derive(Parser)]
#[command(name = "veil_daemon", about = "Veil Network blockchain daemon")]
struct Args {
    /// Data directory for the chain database
    #[arg(long, default_value = "veil-db")]
    dir: String,

    /// Keep the chain in memory only (testing)
    #[arg(long)]
    memory: bool,

    /// Forging worker threads, defaults to the CPU count
    #[arg(long)]
    forging_threads: Option<usize>,

    /// Constant staking difficulty
    #[arg(long, default_value_t = 1024)]
    difficulty: u64,

    /// Seconds a stale solution is delayed before publication
    #[arg(long, default_value_t = 5)]
    stale_solution_delay: u64,

    /// Maintain the wallet-seeding token info index
    #[arg(long)]
    seed_wallet_info: bool,

    /// Accept client-supplied delegated staking keys
    #[arg(long)]
    delegator_accept_custom_keys: bool,

    /// Forge on behalf of these public keys (hex)
    #[arg(long)]
    forger_key: Vec<String>,

    /// Log level filter
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,
}

fn setup_logging(level: log::LevelFilter) -> anyhow::Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                unix_timestamp(),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
        .context("initializing logging")
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(args.log_level)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building the tokio runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let storage: Arc<dyn Store> = if args.memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SledStore::open(&args.dir).context("opening the chain database")?)
    };

    let mut forger_keys = Vec::new();
    for hex_key in &args.forger_key {
        let bytes = hex::decode(hex_key).context("decoding forger key")?;
        let key = CompressedPublicKey::from_bytes(&bytes)
            .map_err(|e| anyhow::anyhow!("invalid forger key: {}", e))?;
        forger_keys.push(key);
    }

    let chain_config = ChainConfig {
        difficulty: args.difficulty,
        seed_wallet_info: args.seed_wallet_info,
        forger_keys,
        genesis_timestamp: 0,
        premine: Vec::new(),
        premine_stake: Vec::new(),
    };
    let forging_config = ForgingConfig {
        threads: args.forging_threads.unwrap_or_else(num_cpus::get),
        stale_timestamp_window: Duration::from_secs(10 * 60),
        stale_solution_delay: Duration::from_secs(args.stale_solution_delay),
    };

    let verifier = Arc::new(StructuralVerifier);
    let mempool = Mempool::start(storage.clone(), verifier.clone());
    let (blockchain, block_rx) =
        Blockchain::new(storage, mempool.clone(), verifier.clone(), chain_config)
            .map_err(|e| anyhow::anyhow!("opening the chain: {}", e))?;

    blockchain.arm_mempool().await;

    // reward synthesis is supplied by the embedder; fees alone here
    let create_forging_transactions: Arc<CreateForgingTransactions> = Arc::new(
        |_block: &BlockComplete, _account: &StakingAccount, _txs: &[Arc<Transaction>]| None,
    );

    let forging = Arc::new(Forging::start(
        forging_config,
        mempool.clone(),
        verifier,
        create_forging_transactions,
        blockchain.solution_sender(),
    ));

    match blockchain.create_forging_work() {
        Ok(work) => forging.new_work(work).await,
        Err(e) => warn!("no initial forging work: {}", e),
    }

    // every new tip rotates the forging work
    {
        let blockchain = blockchain.clone();
        let forging = forging.clone();
        let mut tips = blockchain.subscribe_new_tip();
        tokio::spawn(async move {
            while tips.recv().await.is_ok() {
                match blockchain.create_forging_work() {
                    Ok(work) => forging.new_work(work).await,
                    Err(e) => warn!("could not build forging work: {}", e),
                }
            }
        });
    }

    let delegator = Arc::new(DelegatorNode::new(DelegatorConfig {
        accept_custom_keys: args.delegator_accept_custom_keys,
    }));
    {
        let delegator = delegator.clone();
        let mut tips = blockchain.subscribe_new_tip();
        tokio::spawn(async move {
            while let Ok(tip) = tips.recv().await {
                delegator.update_chain_height(tip.height);
            }
        });
    }

    let _rpc = RpcHandler::new(blockchain.clone(), mempool);
    info!("veil daemon started");

    blockchain.run(block_rx).await;
    Ok(())
}
