//! `campus` entry point

use std::path::{Path, PathBuf};

use anyhow::Context;
use campus_auth::{KeyStore, Role, RoleSet, TokenIssuer, discovery_uri, generate_pem_pair};
use campus_server::{AppState, ServiceConfig};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "campus", version, about = "Campus services with self-issued tokens")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service named by `service.kind`
    Serve {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long, env = "CAMPUS_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Write a new RSA key pair as private.pem and public.pem
    Keygen {
        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
        /// Modulus size
        #[arg(long, default_value_t = 2048)]
        bits: usize,
    },
    /// Print a token signed with this service's key
    Token {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long, env = "CAMPUS_CONFIG")]
        config: Option<PathBuf>,
        /// Subject id
        #[arg(long)]
        subject: String,
        /// Granted roles
        #[arg(long = "role", required = true)]
        roles: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Serve { config } => serve(config.as_deref()).await,
        Command::Keygen { out, bits } => keygen(&out, bits),
        Command::Token {
            config,
            subject,
            roles,
        } => token(config.as_deref(), subject, &roles),
    }
}

fn load_keys(config: &ServiceConfig) -> anyhow::Result<KeyStore> {
    let keys = &config.auth.keys;
    KeyStore::from_pem_files(
        keys.key_id.clone(),
        &keys.private_key_path,
        keys.public_key_path.as_deref(),
    )
    .with_context(|| {
        format!(
            "loading signing key from {}",
            keys.private_key_path.display()
        )
    })
}

async fn serve(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = ServiceConfig::load(config_path).context("loading configuration")?;
    let _guard = config.logging.init().context("initializing logging")?;

    let keys = load_keys(&config)?;
    let state = AppState::new(&config, keys)?;
    let listener = tokio::net::TcpListener::bind(config.service.bind)
        .await
        .with_context(|| format!("binding {}", config.service.bind))?;

    campus_server::serve(listener, state, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl+C received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}

fn keygen(out: &Path, bits: usize) -> anyhow::Result<()> {
    let pair = generate_pem_pair(bits)?;
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let private_path = out.join("private.pem");
    let public_path = out.join("public.pem");
    write_private_key(&private_path, pair.private_pem.as_bytes())
        .with_context(|| format!("writing {}", private_path.display()))?;
    std::fs::write(&public_path, pair.public_pem.as_bytes())
        .with_context(|| format!("writing {}", public_path.display()))?;

    println!("{}", private_path.display());
    println!("{}", public_path.display());
    Ok(())
}

/// Create the key file owner-only before any key bytes reach it
fn write_private_key(path: &Path, pem: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // mode only applies on creation; tighten a file left by an earlier run
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(pem)?;
    file.sync_all()
}

fn token(config_path: Option<&Path>, subject: String, roles: &[String]) -> anyhow::Result<()> {
    let config = ServiceConfig::load(config_path).context("loading configuration")?;
    let keys = load_keys(&config)?;
    let issuer = TokenIssuer::new(
        std::sync::Arc::new(keys),
        discovery_uri(&config.service.public_base_url),
    )
    .with_user_ttl(config.auth.tokens.user_ttl());

    let roles: RoleSet = roles.iter().map(|role| Role::from(role.as_str())).collect();
    let issued = issuer.issue_for(subject, roles)?;
    println!("{}", issued.token.as_str());
    Ok(())
}
