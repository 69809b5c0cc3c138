use anyhow::{Result, Context};
use clap::Parser;
use launch_watch::classifier::{ClassificationContext, Classifier, display_address, format_amount};
use launch_watch::config::{DEFAULT_RPC_URL, validate_address, validate_rpc_url};
use launch_watch::rpc::{ChainSource, SolanaRpc};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "classify")]
#[command(about = "Fetch transactions and print how the classifier reads them", long_about = None)]
struct Args {
    /// Signatures to classify. Ignored when --recent is given.
    signatures: Vec<String>,

    /// Classify the newest N signatures for the token instead.
    #[arg(long)]
    recent: Option<usize>,

    /// Defaults to RPC_URL, then mainnet-beta.
    #[arg(long)]
    rpc_url: Option<String>,

    /// Defaults to TOKEN_ADDRESS.
    #[arg(long)]
    token: Option<String>,

    /// Defaults to POOL_ADDRESS.
    #[arg(long)]
    pool: Option<String>,

    #[arg(long, default_value = "10")]
    timeout_secs: u64,
}

fn from_args_or_env(value: Option<String>, var: &str) -> Option<String> {
    value.or_else(|| std::env::var(var).ok()).filter(|v| !v.is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();

    dotenv::dotenv().ok();
    let args = Args::parse();

    let rpc_url = from_args_or_env(args.rpc_url, "RPC_URL")
        .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
    validate_rpc_url("rpcUrl", &rpc_url)?;

    let token = from_args_or_env(args.token, "TOKEN_ADDRESS")
        .context("--token or TOKEN_ADDRESS must be set")?;
    validate_address("token", &token)?;

    let pool = from_args_or_env(args.pool, "POOL_ADDRESS")
        .context("--pool or POOL_ADDRESS must be set")?;
    validate_address("pool", &pool)?;

    let rpc = SolanaRpc::connect(&rpc_url, Duration::from_secs(args.timeout_secs))
        .await
        .context("Failed to connect to RPC")?;
    info!("🔗 Connected to {}", rpc.url());

    let signatures = match args.recent {
        Some(n) => rpc
            .signatures_for_address(&token, None, None, n)
            .await
            .context("Failed to list signatures")?
            .into_iter()
            .map(|s| s.signature)
            .collect(),
        None => args.signatures,
    };

    if signatures.is_empty() {
        warn!("Nothing to classify: pass signatures or --recent N");
        return Ok(());
    }

    let classifier = Classifier::new(ClassificationContext::new(pool, token));

    for signature in &signatures {
        let tx = match rpc.transaction(signature).await {
            Ok(tx) => tx,
            Err(e) => {
                warn!("⚠️  Failed to fetch TX {}: {}", signature, e);
                continue;
            }
        };

        let c = classifier.classify(&tx);
        println!("\n📝 {}", signature);
        println!("   Slot: {}", tx.slot);
        println!("   Status: {}", if tx.success { "success" } else { "failed" });
        println!("   Direction: {:?}", c.direction);
        println!(
            "   Amount: {}",
            c.amount.as_ref().map(format_amount).unwrap_or_else(|| "-".to_string())
        );
        println!(
            "   Counterparty: {}",
            c.counterparty.as_deref().map(display_address).unwrap_or_else(|| "unknown".to_string())
        );
        println!("   Classified by: {} ({:?})", c.classified_by, c.confidence);
    }

    Ok(())
}
