use anyhow::{Context, Result};
use clap::Parser;
use dhcp_debug::cancel::{self, WaitOutcome};
use dhcp_debug::{SessionConfig, SessionOutcome, session};
use std::process::ExitCode;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dhcp-debug", about = "Run one DHCP lease exchange and report the result")]
struct Args {
    /// Interface to bind to
    #[arg(long, default_value = "")]
    iface: String,

    /// Unicast source address (DHCPv4); empty uses broadcast mode
    #[arg(long, default_value = "")]
    client_host: String,

    /// Unicast source port (DHCPv4)
    #[arg(long, default_value_t = 0)]
    client_port: u16,

    /// Server address (DHCPv4); empty broadcasts
    #[arg(long, default_value = "")]
    host: String,

    /// Server port (DHCPv4)
    #[arg(long, default_value_t = 67)]
    port: u16,

    /// Server or multicast address override (DHCPv6)
    #[arg(long, default_value = "")]
    broadcast_addr: String,

    /// Protocol version
    #[arg(long, default_value_t = 4, value_parser = parse_proto)]
    proto: u8,

    /// DHCPv6 message count: 4 for solicit/advertise/request/reply, anything else for rapid commit
    #[arg(long, default_value_t = 4)]
    num_msg: u32,

    /// Release the lease after acquiring it
    #[arg(long)]
    release: bool,

    /// Session timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout: u64,

    /// Dump every packet and log at debug level
    #[arg(long)]
    debug: bool,
}

fn parse_proto(s: &str) -> Result<u8, String> {
    match s {
        "4" => Ok(4),
        "6" => Ok(6),
        _ => Err(format!("unsupported protocol version '{s}', expected 4 or 6")),
    }
}

impl Args {
    fn session_config(&self) -> Result<SessionConfig, dhcp_debug::ConstructionError> {
        match self.proto {
            6 => SessionConfig::v6(
                &self.iface,
                &self.broadcast_addr,
                self.num_msg,
                self.timeout,
                self.release,
                self.debug,
            ),
            _ => SessionConfig::v4(
                &self.iface,
                &self.client_host,
                self.client_port,
                &self.host,
                self.port,
                self.timeout,
                self.release,
                self.debug,
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let orchestrator = match args
        .session_config()
        .and_then(|config| session::construct(&config))
    {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    let (handle, token) = cancel::token();
    let completion = orchestrator.start(token, args.release);

    let outcome = cancel::wait_or_abort(completion, async {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    })
    .await;

    match &outcome {
        WaitOutcome::Detached => {
            // The session closes its endpoint on its own task.
            handle.cancel();
        }
        WaitOutcome::Finished(report) => {
            match &report.outcome {
                SessionOutcome::Failed(e) => eprintln!("Error: {e}"),
                SessionOutcome::Cancelled => info!("Session cancelled"),
                SessionOutcome::Succeeded(_) => {}
            }
        }
    }

    Ok(ExitCode::from(outcome.exit_code()))
}
