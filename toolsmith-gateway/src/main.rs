use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use toolsmith::config::AuthMode;
use toolsmith::repository::InMemoryRepository;
use toolsmith::security::{CodeValidator, Tier};
use toolsmith::{HostConfig, RuntimeHost};

#[derive(Parser)]
#[command(name = "toolsmith-gateway")]
#[command(version)]
#[command(about = "Multi-tenant MCP tool host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount every active tenant and serve their tools.
    Serve(ServeArgs),
    /// Check a tool source against the capability policy of a tier.
    Validate(ValidateArgs),
}

#[derive(Parser)]
struct ServeArgs {
    #[arg(long, env = "TOOLSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `server.bind_addr`.
    #[arg(long, env = "TOOLSMITH_BIND_ADDR")]
    bind_addr: Option<String>,

    /// JSON document with tenants, deployments and tools.
    #[arg(long, env = "TOOLSMITH_SEED")]
    seed: PathBuf,
}

#[derive(Parser)]
struct ValidateArgs {
    #[arg(long, env = "TOOLSMITH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "restricted")]
    tier: Tier,

    file: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<HostConfig> {
    match path {
        Some(path) => HostConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(HostConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("toolsmith=info")),
        )
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Validate(args) => {
            if !validate(args)? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(bind_addr) = args.bind_addr {
        config.server.bind_addr = bind_addr;
    }
    if config.auth.mode == AuthMode::Static && config.auth.tokens.is_empty() {
        warn!("no tenant tokens configured; every tenant request will be rejected");
    }

    let repository = Arc::new(
        InMemoryRepository::load(&args.seed)
            .with_context(|| format!("loading seed {}", args.seed.display()))?,
    );
    let host = Arc::new(RuntimeHost::from_config(&config, repository));
    let authorizer = toolsmith::auth::from_config(&config.auth);
    let app = toolsmith::http::router(host.clone(), authorizer, &config.server.endpoint_prefix);

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    info!(
        addr = %config.server.bind_addr,
        prefix = %config.server.endpoint_prefix,
        "listening"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serving = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(stop_rx));
    let server = tokio::spawn(async move { serving.await });

    match host.reconcile_on_startup().await {
        Ok(report) => {
            for failure in &report.failed {
                warn!(tenant = %failure.tenant_id, "not mounted: {}", failure.reason);
            }
            info!(
                mounted = report.mounted.len(),
                failed = report.failed.len(),
                "ready"
            );
        }
        Err(e) => {
            error!("startup reconciliation failed: {}", e);
            let _ = stop_tx.send(());
            let _ = server.await;
            host.shutdown().await;
            return Err(e.into());
        }
    }

    server.await??;
    drop(stop_tx);
    host.shutdown().await;
    Ok(())
}

async fn shutdown_signal(stop: oneshot::Receiver<()>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = stop => {}
    }
}

fn validate(args: ValidateArgs) -> anyhow::Result<bool> {
    let config = load_config(args.config.as_ref())?;
    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let validator = CodeValidator::new(Arc::new(config.policy()));

    let errors = validator.validate(&source, args.tier);
    if errors.is_empty() {
        println!("{}: ok ({})", args.file.display(), args.tier);
        return Ok(true);
    }
    for message in &errors {
        println!("{}: {}", args.file.display(), message);
    }
    Ok(false)
}
