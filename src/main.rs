use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use confman::{
    AsteriskCli, Conference, Config, InMemoryDirectory, NotifierChannel, Orchestrator,
    SwitchAdapter,
};

#[derive(Parser)]
#[command(name = "confman", version, about = "Conference invitations with backup redirection")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "confman.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Invite one phone into a conference as a guest
    Invite {
        #[arg(long)]
        conference: String,
        #[arg(long)]
        phone: String,
    },
    /// Invite every participant who is not in the conference yet
    InviteAll {
        #[arg(long)]
        conference: String,
    },
    /// Print the switch's channel table
    Channels,
    /// Print the escalation tree below a contact
    Chain {
        #[arg(long)]
        phone: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("confman=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let switch: Arc<dyn SwitchAdapter> = Arc::new(AsteriskCli::new(config.asterisk.clone()));
    let directory = InMemoryDirectory::from_entries(&config.contacts);

    match &cli.command {
        Command::Channels => {
            for channel in switch.snapshot_channels().await? {
                println!(
                    "{:<40} {:<10} {}",
                    channel.channel_id,
                    format!("{:?}", channel.status),
                    channel.application
                );
            }
            return Ok(());
        }
        Command::Chain { phone } => {
            let tree = directory
                .escalation_tree(phone)
                .with_context(|| format!("No contact with phone {phone}"))?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
            return Ok(());
        }
        _ => {}
    }

    let (channel, sink) = NotifierChannel::new();
    let orchestrator = Orchestrator::new(
        switch,
        Arc::new(directory),
        Arc::new(sink),
        config.redirect.clone(),
    );
    for entry in config.conferences {
        orchestrator.add_conference(Conference::from_entry(entry)?)?;
    }

    match cli.command {
        Command::Invite { conference, phone } => {
            orchestrator.invite_guest(&conference, &phone)?;
        }
        Command::InviteAll { conference } => {
            let invited = orchestrator.invite_offline_participants(&conference).await?;
            info!(invited, "Invitations placed");
        }
        Command::Channels | Command::Chain { .. } => unreachable!("handled above"),
    }

    let engine = orchestrator.engine().clone();
    let idle = engine.wait_idle();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(idle, interrupt);

    loop {
        tokio::select! {
            Some(event) = channel.recv() => println!("{}", event.to_json()),
            _ = &mut idle => {
                for event in channel.drain() {
                    println!("{}", event.to_json());
                }
                info!("All invitations settled");
                break;
            }
            _ = &mut interrupt => {
                warn!(
                    in_flight = engine.in_flight(),
                    "Interrupted with invitations still being watched"
                );
                break;
            }
        }
    }

    Ok(())
}
