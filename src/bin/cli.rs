//! idserver CLI Client
//!
//! Command-line interface for interacting with an idserver.

use clap::{Parser, Subcommand};
use idserver::Client;

/// idserver CLI
#[derive(Parser, Debug)]
#[command(name = "idserver-cli")]
#[command(about = "CLI for the idserver ID service")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:1970")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask for new IDs
    Ask {
        /// The key to allocate from
        key: String,

        /// How many IDs
        #[arg(default_value = "1")]
        n: usize,
    },

    /// Show the last issued ID of a key
    Last {
        /// The key to inspect
        key: String,
    },

    /// Show server statistics
    Dump,
}

fn run(args: Args) -> idserver::Result<()> {
    let mut client = Client::connect(args.server.as_str())?;

    match args.command {
        Commands::Ask { key, n } => {
            for id in client.ask(&key, n)? {
                println!("{}", id);
            }
        }
        Commands::Last { key } => {
            println!("{}", client.last(&key)?);
        }
        Commands::Dump => {
            let answer = client.dump()?;
            println!("keys: {}", answer.keys.unwrap_or_default());
            println!("dirty: {}", answer.dirty.unwrap_or_default());
            println!("clients: {}", answer.clients.unwrap_or_default());
        }
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error [{}]: {}", e.code(), e);
        std::process::exit(1);
    }
}
