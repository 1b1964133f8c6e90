//! protect-watch - command-line client for a UniFi Protect controller.
//!
//! Connection settings come from flags or `UNIFI_*` environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use unifi_realtime::{
    ClientConfig, Credentials, ProtectClient, ProtectEvent, SystemStatus, TlsVerification,
};

#[derive(Parser)]
#[command(name = "protect-watch")]
#[command(version)]
#[command(about = "Watch a UniFi Protect controller's realtime event stream")]
struct Cli {
    /// Controller host name or address
    #[arg(long, env = "UNIFI_HOST")]
    host: String,

    /// Login name
    #[arg(long, env = "UNIFI_USERNAME")]
    username: String,

    /// Login password
    #[arg(long, env = "UNIFI_PASSWORD", hide_env_values = true)]
    password: String,

    /// Accept self-signed controller certificates
    #[arg(long, env = "UNIFI_INSECURE")]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cameras and lights with their connection state
    List,
    /// Print device events until Ctrl-C
    Watch,
    /// Save a camera still image
    Snapshot {
        /// Camera id
        camera_id: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Fetch through the controller instead of from the camera
        #[arg(long)]
        proxy: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::new(cli.host.clone());
    if cli.insecure {
        config.tls = TlsVerification::AcceptInvalidCerts;
    }
    let credentials = Credentials::new(cli.username.clone(), cli.password.clone());

    match cli.command {
        Commands::List => list(config, credentials).await,
        Commands::Watch => watch(config, credentials).await,
        Commands::Snapshot {
            camera_id,
            output,
            proxy,
        } => snapshot(config, credentials, &camera_id, &output, proxy).await,
    }
}

async fn list(config: ClientConfig, credentials: Credentials) -> Result<()> {
    let (client, _events) = ProtectClient::new(config)?;
    client.set_credentials(credentials);

    let status = client
        .fetch_bootstrap()
        .await
        .context("failed to read devices from controller")?;
    print_devices(&status);
    Ok(())
}

fn print_devices(status: &SystemStatus) {
    if let Some(nvr) = &status.nvr {
        println!(
            "{} (Protect {})",
            nvr.name,
            nvr.version.as_deref().unwrap_or("unknown")
        );
    }

    println!("Cameras:");
    for camera in &status.cameras {
        let state = if camera.is_connected { "connected" } else { "offline" };
        println!("  {:<26} {:<24} {:<18} {}", camera.id, camera.name, camera.device_type, state);
    }

    if !status.lights.is_empty() {
        println!("Lights:");
        for light in &status.lights {
            let on = if light.is_light_on { "on" } else { "off" };
            println!("  {:<26} {:<24} {}", light.id, light.name, on);
        }
    }
}

async fn watch(config: ClientConfig, credentials: Credentials) -> Result<()> {
    let (client, mut events) = ProtectClient::new(config)?;
    client
        .open(credentials)
        .await
        .context("failed to connect to controller")?;

    if let Some(status) = client.system_status() {
        println!(
            "Watching {} cameras and {} lights. Ctrl-C to stop.",
            status.cameras.len(),
            status.lights.len()
        );
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if print_event(&event) {
                    break;
                }
            }
        }
    }

    client.close().await?;
    Ok(())
}

/// Print one event. Returns `true` once the stream is over.
fn print_event(event: &ProtectEvent) -> bool {
    match event {
        ProtectEvent::Ring(ring) => {
            println!("[{}] RING    {}", ring.start.format("%H:%M:%S"), ring.camera.name);
        }
        ProtectEvent::Motion(motion) => {
            println!(
                "[{}] MOTION  {} (score {})",
                motion.start.format("%H:%M:%S"),
                motion.camera.name,
                motion.score
            );
        }
        ProtectEvent::SmartDetectZone(detect) => {
            println!(
                "[{}] SMART   {} {}",
                detect.start.format("%H:%M:%S"),
                detect.camera.name,
                detect.smart_detect_types.join(",")
            );
        }
        ProtectEvent::LightToggled(light) => {
            let on = if light.is_light_on { "on" } else { "off" };
            println!("LIGHT   {} switched {}", light.name, on);
        }
        ProtectEvent::Reconnecting { attempt, delay, .. } => {
            println!("Connection lost, reconnect attempt {attempt} in {delay:?}");
        }
        ProtectEvent::ReconnectFailed { attempts, error } => {
            eprintln!("Gave up after {attempts} reconnect attempts: {error}");
        }
        ProtectEvent::Disconnected => {
            println!("Disconnected");
            return true;
        }
        other => log::debug!("{:?}", other),
    }
    false
}

async fn snapshot(
    config: ClientConfig,
    credentials: Credentials,
    camera_id: &str,
    output: &std::path::Path,
    proxy: bool,
) -> Result<()> {
    let (client, _events) = ProtectClient::new(config)?;
    client.set_credentials(credentials);

    let status = client
        .fetch_bootstrap()
        .await
        .context("failed to read devices from controller")?;
    let camera = status
        .camera(camera_id)
        .with_context(|| format!("no camera with id {camera_id}"))?;

    let image = client
        .snapshot(camera, proxy)
        .await
        .with_context(|| format!("failed to fetch snapshot for {camera_id}"))?;

    tokio::fs::write(output, &image)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {} bytes to {}", image.len(), output.display());
    Ok(())
}
