use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use carepay_core::adapters::PostgresTransactionStore;
use carepay_core::cli::{Cli, Commands, DbCommands, TxCommands};
use carepay_core::config::Config;
use carepay_core::gateway::{ChecksumSigner, PhonePeClient};
use carepay_core::services::{run_sweeper, PaymentOrchestrator};
use carepay_core::{cli, create_app, db, AppState};
use clap::Parser;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.json_logs);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Tx(TxCommands::Show { tx_id }) => {
            let orchestrator = build_orchestrator(&config, db::create_pool(&config).await?);
            cli::handle_tx_show(&orchestrator, &tx_id).await
        }
        Commands::Tx(TxCommands::Reconcile) => {
            let orchestrator = build_orchestrator(&config, db::create_pool(&config).await?);
            cli::handle_tx_reconcile(&orchestrator, &config.sweep).await
        }
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
    }
}

fn init_tracing(json: bool) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_orchestrator(config: &Config, pool: PgPool) -> PaymentOrchestrator {
    let store = Arc::new(PostgresTransactionStore::new(pool));
    let gateway = Arc::new(PhonePeClient::new(config.merchant.clone()));
    let signer = ChecksumSigner::new(
        config.merchant.merchant_key.clone(),
        config.merchant.key_index,
    );

    PaymentOrchestrator::new(store, gateway, signer, config.merchant.redirects.clone())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool, Path::new(db::MIGRATIONS_DIR)).await?;

    let orchestrator = Arc::new(build_orchestrator(&config, pool));
    tracing::info!(
        merchant_id = %config.merchant.merchant_id,
        pay_url = %config.merchant.pay_url,
        "Payment gateway client initialized"
    );

    tokio::spawn(run_sweeper(orchestrator.clone(), config.sweep.clone()));

    let app = create_app(AppState {
        orchestrator,
        log_request_body: config.log_request_body,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
