use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use vpn_steward::{
    config, init_telemetry, AdminRoster, ChatTransport, ClientStore, ConsoleTransport, Dispatcher,
    ScriptExecutor,
};

#[derive(Parser)]
#[command(name = "vpn-steward")]
#[command(about = "Operator bot for issuing and revoking VPN client certificates")]
#[command(long_about = "vpn-steward lets configured admins create and revoke VPN client \
                       certificates by driving the certificate management script, and keeps \
                       track of which admin owns which client.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher loop over the console transport (default)
    Run,
    /// Print the stored client table and exit
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry()?;
    vpn_steward::init_config()?;

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_command().await,
        Commands::List => list_command().await,
    }
}

async fn run_command() -> Result<()> {
    let config = config()?;

    let store = ClientStore::connect(&config.database.url, config.database.auto_migrate).await?;
    let roster = AdminRoster::from_config(&config.admins);
    let executor = Arc::new(ScriptExecutor::new(&config.executor));
    let dispatcher = Dispatcher::new(roster, store, executor);

    info!(
        script = %config.executor.script_path,
        database = %config.database.url,
        "vpn-steward ready"
    );
    println!("vpn-steward ready. Lines: <caller_id> </start|/create|/delete|/list|text>");

    let mut transport = ConsoleTransport::new(".");
    while let Some((caller_id, event)) = transport.next_event().await {
        let response = dispatcher.handle(caller_id, event).await;
        transport.send(caller_id, response).await?;
    }

    info!("transport closed, shutting down");
    Ok(())
}

async fn list_command() -> Result<()> {
    let config = config()?;

    let store = ClientStore::connect(&config.database.url, config.database.auto_migrate).await?;
    let roster = AdminRoster::from_config(&config.admins);

    let records = store.list(None).await?;
    if records.is_empty() {
        println!("📂 No clients found.");
    } else {
        for record in &records {
            let owner = roster
                .display_name(record.owner_id)
                .unwrap_or("Unknown Admin");
            println!("{}  (owner: {} / {})", record.name, owner, record.owner_id);
        }
        println!();
        println!("{} client(s) total", records.len());
    }

    store.shutdown().await;
    Ok(())
}
