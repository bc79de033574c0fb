//! kvmux CLI Client
//!
//! Command-line interface for talking to a key-value server.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kvmux::{Config, KvClient};
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status when the server went away mid-command
const EXIT_CONNECTION_LOST: u8 = 2;

/// kvmux CLI
#[derive(Parser, Debug)]
#[command(name = "kvmux-cli")]
#[command(about = "CLI for a kvmux key-value server")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Per-request timeout in milliseconds (0 = wait forever)
    #[arg(short, long, default_value = "0")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check credentials
    Auth { username: String, password: String },

    /// Create an account
    Register { username: String, password: String },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Get several keys at once
    Mget {
        /// The keys to get
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Get a key once another key holds a given value
    GetWhen {
        key: String,
        cond_key: String,
        cond_value: String,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvmux=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .server_addr(&args.server)
        .request_timeout_ms(args.timeout_ms)
        .build();

    let client = match KvClient::connect_with_config(config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to connect to {}: {}", args.server, e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&client, args.command, args.timeout_ms);

    if let Err(e) = client.close() {
        tracing::warn!("Error closing connection: {}", e);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_connection_lost() => {
            tracing::error!("Lost connection to {}: {}", args.server, e);
            ExitCode::from(EXIT_CONNECTION_LOST)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(client: &KvClient, command: Commands, timeout_ms: u64) -> kvmux::Result<()> {
    match command {
        Commands::Auth { username, password } => {
            let accepted = client.authenticate(&username, &password)?;
            println!("{}", if accepted { "authenticated" } else { "rejected" });
        }
        Commands::Register { username, password } => {
            let created = client.register(&username, &password)?;
            println!("{}", if created { "registered" } else { "rejected" });
        }
        Commands::Put { key, value } => {
            client.put(&key, value.as_bytes())?;
            println!("OK");
        }
        Commands::Get { key } => match client.get(&key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Mget { keys } => {
            let values = client.multi_get(keys.iter().cloned())?;
            for key in &keys {
                match values.get(key) {
                    Some(value) => println!("{} = {}", key, String::from_utf8_lossy(value)),
                    None => println!("{} = (nil)", key),
                }
            }
        }
        Commands::GetWhen {
            key,
            cond_key,
            cond_value,
        } => {
            let value = if timeout_ms > 0 {
                client.get_when_timeout(
                    &key,
                    &cond_key,
                    cond_value.as_bytes(),
                    std::time::Duration::from_millis(timeout_ms),
                )?
            } else {
                client.get_when(&key, &cond_key, cond_value.as_bytes())?
            };
            println!("{}", String::from_utf8_lossy(&value));
        }
    }
    Ok(())
}
