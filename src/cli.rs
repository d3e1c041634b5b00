use clap::{Parser, Subcommand};

use crate::config::{Config, SweepConfig};
use crate::services::{sweep_once, PaymentOrchestrator};

#[derive(Parser)]
#[command(name = "carepay-core")]
#[command(about = "CarePay Core - hosted checkout payment service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the pending sweeper (default)
    Serve,

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Print a transaction as JSON
    Show {
        #[arg(value_name = "TX_ID")]
        tx_id: String,
    },

    /// Run one pending-payment sweep and exit
    Reconcile,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_show(orchestrator: &PaymentOrchestrator, tx_id: &str) -> anyhow::Result<()> {
    let tx = orchestrator.transaction(tx_id).await?;
    println!("{}", serde_json::to_string_pretty(&tx)?);
    Ok(())
}

pub async fn handle_tx_reconcile(
    orchestrator: &PaymentOrchestrator,
    sweep: &SweepConfig,
) -> anyhow::Result<()> {
    tracing::info!("Reconciling stale pending payments...");
    let report = sweep_once(orchestrator, sweep).await?;

    println!("✓ Pending sweep finished");
    println!("  Examined:      {}", report.examined);
    println!("  Settled:       {}", report.settled);
    println!("  Expired:       {}", report.expired);
    println!("  Still pending: {}", report.still_pending);
    println!("  Errors:        {}", report.errors);

    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    use std::path::Path;

    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool, Path::new(crate::db::MIGRATIONS_DIR)).await?;

    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Merchant ID: {}", config.merchant.merchant_id);
    println!("  Key Index: {}", config.merchant.key_index);
    println!("  Pay URL: {}", config.merchant.pay_url);
    println!("  Status URL: {}", config.merchant.status_url);
    println!(
        "  Gateway Timeout: {}s",
        config.merchant.request_timeout.as_secs()
    );

    let pool = crate::db::create_pool(config).await.ok();
    let report = crate::startup::validate_environment(config, pool.as_ref()).await;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration is invalid");
    }

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
