use clap::{Parser, Subcommand};

use crate::client::run_steam_client;

#[derive(Parser)]
#[command(version, name = "steam")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Start the external cluster via Steam and hold it until interrupted")]
    Connect {
        #[arg(long, help = "The Steam WebSocket URL, overriding the configuration")]
        url: Option<String>,
        #[arg(long, default_value = "steam-cli", help = "The job name reported in the logs")]
        job: String,
    },
    #[command(about = "Answer stop requests from Steam without using the external cluster")]
    Listen {
        #[arg(long, help = "The Steam WebSocket URL, overriding the configuration")]
        url: Option<String>,
    },
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);

    match cli.command {
        Command::Connect { url, job } => run_steam_client(url, Some(job)),
        Command::Listen { url } => run_steam_client(url, None),
    }
}
