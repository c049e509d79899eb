use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use actum::http::build_router;
use actum::views::{EventSummary, EvaluationResponse};
use actum::{initialize, AppState, RootConfig, RootError};
use actum_audit::{verify_bundle, ChainSigner, ExportBundle, QueryParams};
use actum_core::{Action, EventId, PolicyVersion, RiskTier};
use actum_policy::EvaluationRequest;

/// Actum: EU AI Act policy decisions with a tamper-evident audit trail.
#[derive(Parser, Debug)]
#[command(name = "actum", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a configuration file with a fresh audit secret
    Init {
        /// Data directory for Actum state
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Start the HTTP API
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,

        /// Port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Evaluate one prompt and commit the decision
    Evaluate {
        #[arg(long)]
        text: String,

        #[arg(long, default_value = "anonymous")]
        user: String,

        #[arg(long, default_value = "cli")]
        client_id: String,

        /// Image file to evaluate alongside the text
        #[arg(long)]
        image: Option<PathBuf>,

        /// Evaluate against this published pack instead of the active one
        #[arg(long)]
        pack: Option<String>,
    },

    /// Show recent audit events, most recent first
    Audit {
        /// Maximum number of entries to display
        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(long)]
        decision: Option<Action>,

        #[arg(long)]
        risk_level: Option<RiskTier>,

        #[arg(long)]
        user: Option<String>,
    },

    /// Replay the audit chain from genesis
    Verify,

    /// Export the evidence bundle for one event
    Export {
        event_id: String,

        /// Write the bundle here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Check an exported bundle against the configured secret
    VerifyBundle { file: PathBuf },

    /// List published policy packs
    Packs {
        /// Make this pack active and record it in the config file
        #[arg(long)]
        activate: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("actum=debug,actum_policy=debug,actum_audit=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("actum=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<RootConfig, RootError> {
    match path {
        Some(p) => RootConfig::load(p),
        None => {
            let default_path = RootConfig::default_config_path();
            RootConfig::load(&default_path)
        }
    }
}

fn load_state(path: Option<&PathBuf>) -> Result<AppState, RootError> {
    initialize(load_config(path)?)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RootError> {
    let config = cli.config.as_ref();
    match cli.command {
        Commands::Init { data_dir } => cmd_init(config, data_dir),
        Commands::Serve { bind, port } => cmd_serve(config, bind, port).await,
        Commands::Evaluate {
            text,
            user,
            client_id,
            image,
            pack,
        } => cmd_evaluate(config, text, user, client_id, image, pack).await,
        Commands::Audit {
            limit,
            decision,
            risk_level,
            user,
        } => cmd_audit(
            config,
            QueryParams {
                decision,
                risk_level,
                user,
                limit: Some(limit),
                offset: None,
            },
        ),
        Commands::Verify => cmd_verify(config),
        Commands::Export { event_id, out } => cmd_export(config, &event_id, out),
        Commands::VerifyBundle { file } => cmd_verify_bundle(config, &file),
        Commands::Packs { activate } => cmd_packs(config, activate),
    }
}

fn cmd_init(config_path: Option<&PathBuf>, data_dir: Option<PathBuf>) -> Result<(), RootError> {
    let mut config = load_config(config_path)?;
    if let Some(dd) = data_dir {
        config.data_dir = dd;
    }
    if config.audit.hmac_secret.is_none() {
        let secret = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        config.audit.hmac_secret = Some(secret);
    }
    config.validate()?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(RootConfig::default_config_path);
    config.save(&save_path)?;
    info!(path = %save_path.display(), "configuration written");

    println!("Actum initialized.");
    println!("  Data dir:  {}", config.data_dir.display());
    println!("  Audit db:  {}", config.database_path().display());
    println!("  Config:    {}", save_path.display());
    println!("Keep the config file private: it holds the audit signing secret.");
    Ok(())
}

async fn cmd_serve(
    config_path: Option<&PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<(), RootError> {
    let mut config = load_config(config_path)?;
    if let Some(b) = bind {
        config.server.bind = b;
    }
    if let Some(p) = port {
        config.server.port = p;
    }
    let addr = format!("{}:{}", config.server.bind, config.server.port);

    let state = Arc::new(initialize(config)?);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "actum listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("actum stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}

async fn cmd_evaluate(
    config_path: Option<&PathBuf>,
    text: String,
    user: String,
    client_id: String,
    image: Option<PathBuf>,
    pack: Option<String>,
) -> Result<(), RootError> {
    let state = load_state(config_path)?;
    let mut request = EvaluationRequest::text(text, client_id, user);
    if let Some(path) = image {
        request = request.with_image(std::fs::read(&path)?);
    }
    let pack = pack.map(PolicyVersion::new);
    let response: EvaluationResponse = state.evaluate_with_pack(request, pack.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_audit(config_path: Option<&PathBuf>, params: QueryParams) -> Result<(), RootError> {
    let state = load_state(config_path)?;
    let events = state.trail.query_events(params)?;

    println!("Audit Log ({} entries):", events.len());
    if events.is_empty() {
        println!("  (no entries)");
    }
    for event in events {
        let e = EventSummary::from(event);
        println!(
            "  #{:<6} {}  {:<5} {:<12} {:<16} {}",
            e.sequence,
            e.timestamp,
            e.decision.as_str(),
            e.risk_level.as_str(),
            e.user,
            e.event_id
        );
    }
    Ok(())
}

fn cmd_verify(config_path: Option<&PathBuf>) -> Result<(), RootError> {
    let state = load_state(config_path)?;
    let report = state.trail.verify_chain()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.valid {
        return Err(RootError::Audit(actum_audit::AuditError::TamperDetected {
            sequence: report.first_invalid.unwrap_or_default(),
            reason: report.reason.unwrap_or_default(),
        }));
    }
    Ok(())
}

fn cmd_export(
    config_path: Option<&PathBuf>,
    event_id: &str,
    out: Option<PathBuf>,
) -> Result<(), RootError> {
    let state = load_state(config_path)?;
    let bundle = state.trail.export_bundle(&EventId::new(event_id))?;
    let json = serde_json::to_string_pretty(&bundle)?;
    match out {
        Some(path) => {
            std::fs::write(&path, json)?;
            println!("Bundle for {} written to {}", event_id, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn cmd_verify_bundle(config_path: Option<&PathBuf>, file: &Path) -> Result<(), RootError> {
    let config = load_config(config_path)?;
    let secret = config.hmac_secret()?;
    let signer = ChainSigner::new(secret.as_bytes())?;

    let bundle: ExportBundle = serde_json::from_slice(&std::fs::read(file)?)?;
    verify_bundle(&bundle, &signer)?;
    println!(
        "Bundle for {} (sequence {}) verifies: {} override(s) checked.",
        bundle.event.event_id,
        bundle.event.sequence,
        bundle.overrides.len()
    );
    Ok(())
}

fn cmd_packs(config_path: Option<&PathBuf>, activate: Option<String>) -> Result<(), RootError> {
    let mut config = load_config(config_path)?;
    let activated = activate.is_some();
    if let Some(version) = activate {
        config.policy.active_version = Some(PolicyVersion::new(version));
    }
    // Initializing first rejects a version that is not published.
    let state = initialize(config.clone())?;
    if activated {
        let save_path = config_path
            .cloned()
            .unwrap_or_else(RootConfig::default_config_path);
        config.save(&save_path)?;
        info!(
            version = ?config.policy.active_version.as_ref().map(PolicyVersion::as_str),
            path = %save_path.display(),
            "active pack recorded"
        );
    }
    for pack in state.policy_packs()? {
        let marker = if pack.is_active { "*" } else { " " };
        println!(
            "{} {:<24} {:<40} {}",
            marker, pack.version, pack.name, pack.created_at
        );
    }
    for tag in state.policy_tags()? {
        println!(
            "    {:<20} {:<12} {:<5} {}",
            tag.name,
            tag.risk_level.as_str(),
            tag.action.as_str(),
            tag.description
        );
    }
    Ok(())
}
