//! Pairguard - Failover Arbitration for HA Appliance Pairs
//!
//! Runs one node of a two-node HA pair and talks to a running node's API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pairguard::api::HttpServer;
use pairguard::clock::SystemClock;
use pairguard::config::{LoggingConfig, PairguardConfig};
use pairguard::error::{Error, Result};
use pairguard::heartbeat::{run_ticker, ChannelSender, HeartbeatTransport};
use pairguard::plane::{IpNetworkPlane, LoggingNetworkPlane, NetworkPlane, RoleActuator};
use pairguard::state::{ClusterArbiter, ClusterRole, ClusterStatus, Collaborators};
use pairguard::uptime::{PeerUptime, SystemUptime, UptimeSource};

/// Pairguard - Failover arbitration for HA appliance pairs
#[derive(Parser)]
#[command(name = "pairguard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "pairguard.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Pairguard node
    Start {
        /// Role to take at startup (active or standby), overrides cluster.initial_role
        #[arg(long)]
        role: Option<String>,
    },

    /// Show cluster status of a running node
    Status {
        /// Node API address to query
        #[arg(short, long, default_value = "127.0.0.1:7780")]
        address: String,
    },

    /// Force the role of a running node (operator override)
    ForceRole {
        /// active or standby
        role: String,

        /// Node API address
        #[arg(short, long, default_value = "127.0.0.1:7780")]
        address: String,
    },

    /// Configure split-brain recovery on a running node
    Recovery {
        /// enable or disable
        mode: String,

        /// Election policy (serial-number or uptime)
        #[arg(short, long)]
        policy: Option<String>,

        /// Node API address
        #[arg(short, long, default_value = "127.0.0.1:7780")]
        address: String,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "pairguard.toml")]
        output: PathBuf,

        /// Serial number of this node
        #[arg(long, default_value = "SN1000")]
        serial: String,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when one is readable
    let logging = PairguardConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(cli.log_level.as_deref(), &logging)?;

    match cli.command {
        Commands::Start { role } => {
            run_start(cli.config, role).await
        }
        Commands::Status { address } => {
            run_status(address).await
        }
        Commands::ForceRole { role, address } => {
            run_force_role(address, role).await
        }
        Commands::Recovery { mode, policy, address } => {
            run_recovery(address, mode, policy).await
        }
        Commands::Init { output, serial } => {
            run_init(output, serial)
        }
        Commands::Validate => {
            run_validate(cli.config)
        }
    }
}

/// Initialize logging
fn init_logging(level: Option<&str>, config: &LoggingConfig) -> Result<()> {
    let level = level.unwrap_or(&config.level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let json = config.format.eq_ignore_ascii_case("json");

    match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            let writer = std::sync::Mutex::new(file);
            if json {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                    .init();
            }
        }
        None => {
            if json {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer())
                    .init();
            }
        }
    }

    Ok(())
}

/// Start the Pairguard node
async fn run_start(config_path: PathBuf, role: Option<String>) -> Result<()> {
    tracing::info!("Starting Pairguard node...");

    // Load configuration
    let config = match PairguardConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    tracing::info!(
        "Loaded configuration for node {} in cluster {}",
        config.node.serial,
        config.cluster.id
    );

    let initial_role = match role {
        Some(name) => match ClusterRole::parse(&name)? {
            r @ (ClusterRole::Active | ClusterRole::Standby) => Some(r),
            other => {
                return Err(Error::InvalidArgument(format!(
                    "--role must be active or standby, got {}",
                    other
                )))
            }
        },
        None => config.initial_role()?,
    };

    // Collaborators
    let peer_uptime = Arc::new(PeerUptime::new());
    let uptime: Arc<dyn UptimeSource> = Arc::new(SystemUptime::new(Arc::clone(&peer_uptime)));

    let plane: Arc<dyn NetworkPlane> = if config.network.dry_run {
        tracing::warn!("Network plane in dry-run mode, no addresses will be moved");
        Arc::new(LoggingNetworkPlane)
    } else {
        tracing::info!(
            "Managing {} virtual IP(s) on {}",
            config.network.virtual_ips.len(),
            config.network.interface
        );
        Arc::new(IpNetworkPlane::from_config(&config.network))
    };

    // Outgoing heartbeats: arbiter -> transport
    let (heartbeat_tx, heartbeat_rx) = mpsc::channel(64);

    let arbiter = Arc::new(
        ClusterArbiter::new(Collaborators {
            actuator: RoleActuator::new(plane),
            sender: Arc::new(ChannelSender::new(heartbeat_tx)),
            uptime: Arc::clone(&uptime),
            clock: Arc::new(SystemClock),
        })
        .with_heartbeat_timeout(config.heartbeat_timeout()),
    );

    arbiter.init(config.cluster.id, &config.node.serial)?;
    arbiter.set_election_policy(config.cluster.election_policy)?;
    arbiter.set_auto_recovery(config.cluster.split_brain_recovery.is_automatic())?;

    if let Some(role) = initial_role {
        tracing::info!("Taking initial role {}", role);
        arbiter.force_role(role)?;
    }

    // Heartbeat transport
    let transport = match HeartbeatTransport::bind(
        &config.node.bind_address,
        &config.node.peer_address,
        config.cluster.id,
        Arc::clone(&arbiter),
        Arc::clone(&uptime),
        Arc::clone(&peer_uptime),
    )
    .await
    {
        Ok(t) => Arc::new(t),
        Err(e) => {
            tracing::error!("Failed to start heartbeat transport: {}", e);
            return Err(e);
        }
    };

    let sender_transport = Arc::clone(&transport);
    let sender_handle = tokio::spawn(async move {
        sender_transport.run_sender(heartbeat_rx).await;
    });

    let receiver_transport = Arc::clone(&transport);
    let receiver_handle = tokio::spawn(async move {
        receiver_transport.run_receiver().await;
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker_handle = tokio::spawn(run_ticker(
        Arc::clone(&arbiter),
        config.heartbeat_interval(),
        shutdown_rx,
    ));

    // HTTP API
    let http_server = HttpServer::new(
        config.api.clone(),
        config.node.serial.clone(),
        Arc::clone(&arbiter),
    );
    tokio::spawn(async move {
        if let Err(e) = http_server.start().await {
            tracing::error!("HTTP API failed: {}", e);
        }
    });

    tracing::info!("Pairguard node running (Ctrl+C to stop)");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    transport.stop();
    let _ = tokio::join!(ticker_handle, sender_handle, receiver_handle);

    if let Ok(status) = arbiter.get_status() {
        tracing::info!("Stopped as {} (peer {})", status.local_role, status.peer_role);
    }

    Ok(())
}

/// Print a status snapshot
fn print_status(status: &ClusterStatus) {
    println!("Cluster {}", status.cluster_id);
    println!("  Local:      {} ({})", status.local_role, status.local_serial);
    println!("  Peer:       {} ({})", status.peer_role, status.peer_serial);
    println!("  Heartbeat:  {}", if status.heartbeat_up { "UP" } else { "DOWN" });
    match status.last_heartbeat_rx {
        Some(at) => println!("  Last rx:    {}", at.to_rfc3339()),
        None => println!("  Last rx:    never"),
    }
    println!(
        "  Recovery:   {} ({})",
        if status.auto_recovery_enabled { "automatic" } else { "manual" },
        status.election_policy
    );
    if status.split_brain_detected {
        println!("  *** SPLIT-BRAIN DETECTED ***");
    }
}

/// Decode an API response, surfacing API errors
async fn read_response(response: reqwest::Response) -> Result<ClusterStatus> {
    if response.status().is_success() {
        response.json().await.map_err(|e| Error::Network(e.to_string()))
    } else {
        let code = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Network(format!("{}: {}", code, body)))
    }
}

/// Show cluster status
async fn run_status(address: String) -> Result<()> {
    let url = format!("http://{}/status", address);

    match reqwest::get(&url).await {
        Ok(response) => {
            let status = read_response(response).await?;
            print_status(&status);
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to get status: {}", e);
            Err(Error::Network(e.to_string()))
        }
    }
}

/// Force the role of a node
async fn run_force_role(address: String, role: String) -> Result<()> {
    let url = format!("http://{}/admin/role", address);
    let client = reqwest::Client::new();

    let response = client
        .post(&url)
        .json(&serde_json::json!({ "role": role }))
        .send()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    let status = read_response(response).await?;
    println!("Role forced to {}", status.local_role);
    print_status(&status);
    Ok(())
}

/// Configure split-brain recovery
async fn run_recovery(address: String, mode: String, policy: Option<String>) -> Result<()> {
    let enabled = match mode.to_ascii_lowercase().as_str() {
        "enable" | "automatic" | "on" => true,
        "disable" | "manual" | "off" => false,
        other => {
            return Err(Error::InvalidArgument(format!(
                "recovery mode must be enable or disable, got '{}'",
                other
            )))
        }
    };
    let policy = policy
        .map(|p| p.parse::<pairguard::state::ElectionPolicy>())
        .transpose()?;

    let url = format!("http://{}/admin/recovery", address);
    let client = reqwest::Client::new();

    let response = client
        .post(&url)
        .json(&serde_json::json!({ "enabled": enabled, "policy": policy }))
        .send()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    let status = read_response(response).await?;
    print_status(&status);
    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf, serial: String) -> Result<()> {
    let config_content = format!(r#"# Pairguard Configuration
# Generated configuration file

[node]
serial = "{serial}"
bind_address = "0.0.0.0:7700"
peer_address = "192.168.100.2:7700"

[cluster]
id = 1
heartbeat_interval_ms = 1000
heartbeat_timeout_ms = 3000
split_brain_recovery = "manual"
election_policy = "serial-number"
# initial_role = "standby"

[network]
interface = "eth0"
virtual_ips = ["192.168.1.100/24"]
dry_run = true

[api]
enabled = true
bind_address = "127.0.0.1:7780"

[logging]
level = "info"
format = "pretty"
"#);

    if output.exists() {
        return Err(Error::Config(format!("{:?} already exists", output)));
    }

    std::fs::write(&output, config_content)?;
    println!("Configuration written to {:?}", output);
    println!("Edit node.peer_address and network.virtual_ips, then set network.dry_run = false");
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    let config = PairguardConfig::from_file(&config_path)?;

    println!("Configuration is valid");
    println!("  Serial:      {}", config.node.serial);
    println!("  Cluster ID:  {}", config.cluster.id);
    println!("  Heartbeat:   {} -> {}", config.node.bind_address, config.node.peer_address);
    println!(
        "  Timing:      every {:?}, timeout {:?}",
        config.heartbeat_interval(),
        config.heartbeat_timeout()
    );
    println!(
        "  Recovery:    {:?} ({})",
        config.cluster.split_brain_recovery, config.cluster.election_policy
    );
    println!(
        "  Network:     {} {:?}{}",
        config.network.interface,
        config.network.virtual_ips,
        if config.network.dry_run { " (dry run)" } else { "" }
    );
    Ok(())
}
