//! Custodial trader CLI
//!
//! Command-line stand-in for the chat front-end: each subcommand maps to one
//! user intent against the execution engine.

use alloy::primitives::{Address, U256};
use clap::{Parser, Subcommand};
use custody_trader::chain::RpcChain;
use custody_trader::config::{ENCRYPTION_KEY_ENV, QUOTE_API_KEY_ENV};
use custody_trader::executor::AuditLog;
use custody_trader::ledger::TradeLedger;
use custody_trader::quote::price::PriceClient;
use custody_trader::quote::{QuoteClient, QuoteSource};
use custody_trader::store::SqliteStore;
use custody_trader::tokens::{addresses, is_suspicious_symbol};
use custody_trader::vault::{EncryptionKey, KeyVault};
use custody_trader::wallet::WalletCustody;
use custody_trader::{Config, Error, Result, RpcConfig, TradeExecutor, UserError};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "trader")]
#[command(about = "Custodial swap execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh wallet encryption key
    Keygen,

    /// Show a user's wallet address, creating the wallet on first use
    Wallet { user: String },

    /// Import a private key for a user, replacing any existing wallet
    Import {
        user: String,

        /// Environment variable holding the hex private key
        #[arg(long, default_value = "IMPORT_PRIVATE_KEY")]
        key_env: String,
    },

    /// Spend native ETH on a token
    Buy {
        user: String,
        /// Token contract address
        token: String,
        /// ETH amount, e.g. 0.01
        eth: String,
    },

    /// Sell a token for native ETH
    Sell {
        user: String,
        /// Token contract address
        token: String,
        /// Token amount in whole units, e.g. 1500.5
        amount: String,
    },

    /// Show a user's current holdings
    Holdings {
        user: String,

        /// Include symbols that look like airdrop spam
        #[arg(long)]
        all: bool,
    },

    /// Show a user's trade history, newest first
    History {
        user: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Fetch a swap quote without trading
    Quote {
        /// Sell token address, or "eth"
        sell: String,
        /// Buy token address, or "eth"
        buy: String,
        /// Sell amount in smallest units
        amount: String,

        /// Taker address (defaults to the zero address)
        #[arg(long)]
        taker: Option<String>,
    },

    /// Settle trades left unconfirmed by an earlier run
    Reconcile,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Keygen => {
            let key = EncryptionKey::generate();
            println!("{}={}", ENCRYPTION_KEY_ENV, key.to_base64().as_str());
        }
        Commands::Wallet { user } => {
            let address = custody(&config)?.get_or_create(&user)?;
            println!("{}", address);
        }
        Commands::Import { user, key_env } => {
            let key = zeroize::Zeroizing::new(std::env::var(&key_env).map_err(|_| {
                UserError::InvalidArgument(format!("{} is not set", key_env))
            })?);
            let custody = custody(&config)?;
            if let Some(previous) = custody.address(&user)? {
                tracing::warn!(user = %user, %previous, "Replacing existing wallet");
            }
            let address = custody.import(&user, &key)?;
            println!("{}", address);
        }
        Commands::Buy { user, token, eth } => {
            let token = parse_token(&token)?;
            let outcome = executor(&config)?.execute_buy(&user, token, &eth).await?;
            print_json(&outcome)?;
        }
        Commands::Sell { user, token, amount } => {
            let token = parse_token(&token)?;
            let outcome = executor(&config)?
                .execute_sell(&user, token, &amount)
                .await?;
            print_json(&outcome)?;
        }
        Commands::Holdings { user, all } => {
            let store = SqliteStore::new(&config.database_path)?;
            for holding in store.holdings(&user)? {
                let suspicious = is_suspicious_symbol(&holding.symbol);
                if suspicious && !all {
                    continue;
                }
                let flag = if suspicious { "  (suspicious)" } else { "" };
                println!("{:<12} {}{}", holding.symbol, holding.amount, flag);
            }
        }
        Commands::History { user, limit } => {
            let store = SqliteStore::new(&config.database_path)?;
            print_json(&store.history(&user, limit)?)?;
        }
        Commands::Quote {
            sell,
            buy,
            amount,
            taker,
        } => {
            run_quote(&config, &sell, &buy, &amount, taker.as_deref()).await?;
        }
        Commands::Reconcile => {
            let report = executor(&config)?.reconcile().await?;
            print_json(&report)?;
        }
        Commands::Config => {
            print_json(&config)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

fn custody(config: &Config) -> Result<WalletCustody> {
    let key = EncryptionKey::from_env(ENCRYPTION_KEY_ENV)?;
    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    Ok(WalletCustody::new(Arc::new(KeyVault::new(key)), store))
}

fn executor(config: &Config) -> Result<TradeExecutor> {
    let key = EncryptionKey::from_env(ENCRYPTION_KEY_ENV)?;
    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    let custody = WalletCustody::new(Arc::new(KeyVault::new(key)), store.clone());

    let rpc = RpcConfig::from_env(config.network);
    tracing::info!(network = config.network.name(), chain_id = rpc.chain_id(), "Connecting");

    let executor = TradeExecutor::new(
        custody,
        Arc::new(RpcChain::new(&rpc)?),
        Arc::new(quote_client(config)?),
        Arc::new(PriceClient::new(&config.price, config.network)?),
        store,
        config.execution.clone(),
    );

    Ok(match &config.audit_log_path {
        Some(path) => executor.with_audit_log(AuditLog::new(path)),
        None => executor,
    })
}

fn quote_client(config: &Config) -> Result<QuoteClient> {
    QuoteClient::new(
        &config.quote,
        config.network,
        std::env::var(QUOTE_API_KEY_ENV).ok(),
    )
}

async fn run_quote(
    config: &Config,
    sell: &str,
    buy: &str,
    amount: &str,
    taker: Option<&str>,
) -> Result<()> {
    let sell = parse_token(sell)?;
    let buy = parse_token(buy)?;
    let amount: U256 = amount
        .parse()
        .map_err(|_| UserError::InvalidAmount(format!("'{}' is not an integer amount", amount)))?;
    let taker = taker.map(parse_token).transpose()?.unwrap_or(Address::ZERO);

    let quote = quote_client(config)?
        .fetch_quote(sell, buy, amount, taker)
        .await?;

    println!("Sell amount:      {}", quote.sell_amount);
    println!("Buy amount:       {}", quote.buy_amount);
    println!("Allowance target: {}", quote.allowance_target);
    println!("Call target:      {}", quote.transaction.to);
    println!("Call value:       {}", quote.transaction.value);
    println!("Calldata bytes:   {}", quote.transaction.data.len());
    Ok(())
}

fn parse_token(input: &str) -> Result<Address> {
    if input.eq_ignore_ascii_case("eth") {
        return Ok(addresses::NATIVE_ETH);
    }
    input
        .trim()
        .parse()
        .map_err(|_| UserError::InvalidArgument(format!("'{}' is not an address", input)).into())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("Failed to render output: {}", e)))?;
    println!("{}", json);
    Ok(())
}
