use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leaseclient::{Config, Orchestrator, Outcome, Result};

#[derive(Parser)]
#[command(name = "leaseclient")]
#[command(author, version, about = "A broadcast lease client", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a lease on the client port and keep it until Ctrl-C.
    Run,
    /// Acquire leases for many clients at once, without renewing them.
    Simulate {
        #[arg(short = 'n', long)]
        clients: Option<usize>,
    },
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load_or_create(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting lease client with config: {:?}", cli.config);
            let orchestrator = Orchestrator::new(config);
            let (cancel_tx, cancel_rx) = watch::channel(false);

            let client = orchestrator.run_single(cancel_rx);
            tokio::pin!(client);

            let outcome = tokio::select! {
                outcome = &mut client => outcome?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal, releasing lease...");
                    let _ = cancel_tx.send(true);
                    client.await?
                }
            };

            match outcome {
                Outcome::Released { ip } => println!("Released {}.", ip),
                Outcome::Cancelled => println!("Stopped before a lease was bound."),
            }
            Ok(())
        }
        Commands::Simulate { clients } => {
            let clients = clients.unwrap_or(config.simulated_clients);
            let orchestrator = Orchestrator::new(config);
            let reports = orchestrator.run_simulation(clients).await?;

            println!("{:<10} {:<20} {:<16} {:<10}", "Client", "Identity", "IP Address", "Lease");
            println!("{}", "-".repeat(58));

            for report in reports {
                match &report.result {
                    Ok(lease) => println!(
                        "{:<10} {:<20} {:<16} {:<10}",
                        report.instance,
                        report.identity.to_string(),
                        lease.assigned_ip.to_string(),
                        format!("{}s", lease.lease_seconds)
                    ),
                    Err(error) => println!(
                        "{:<10} {:<20} {}",
                        report.instance,
                        report.identity.to_string(),
                        error
                    ),
                }
            }

            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
