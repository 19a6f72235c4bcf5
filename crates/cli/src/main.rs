//! Larder CLI - inspect and maintain a file-backed Larder store.
//!
//! # Usage
//!
//! ```bash
//! # List every key in the store
//! larder --store-dir ./data keys
//!
//! # Show a cache entry or scoped set
//! larder inspect cache:listings
//!
//! # Drop one cache entry, or all of them
//! larder clear listings
//! larder clear --all
//!
//! # Show the guest wishlist, or a user's basket
//! larder show wishlist
//! larder show basket --user alice
//!
//! # Fold guest sets into a user's sets
//! larder migrate --user alice
//! ```
//!
//! Configuration comes from `LARDER_*` environment variables (see
//! `larder_store::config`). Logs go to stderr; set `LARDER_LOG_FORMAT=json`
//! for JSON lines.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Resource;

#[derive(Parser)]
#[command(name = "larder")]
#[command(author, version, about = "Larder store tools")]
struct Cli {
    /// Store directory (overrides `LARDER_STORE_DIR`)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored keys
    Keys {
        /// Only keys starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },
    /// Show the value stored at a raw key
    Inspect {
        /// Storage key, as printed by `keys`
        key: String,
    },
    /// Remove cache entries
    Clear {
        /// Resource of the entry to remove
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        resource: Option<String>,

        /// Further key components (e.g. an identity or a page)
        components: Vec<String>,

        /// Remove every cache entry
        #[arg(long)]
        all: bool,
    },
    /// Print this store's guest ID
    GuestId,
    /// Show a wishlist or basket
    Show {
        /// Which set
        #[arg(value_enum)]
        resource: Resource,

        /// User whose set to show (default: the guest)
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Merge guest sets into a user's sets
    Migrate {
        /// User receiving the guest sets
        #[arg(short, long)]
        user: String,
    },
}

fn main() {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli);

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("larder_store=info,larder_cli=info"));
    let json = std::env::var("LARDER_LOG_FORMAT")
        .is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = commands::config(cli.store_dir)?;

    match cli.command {
        Commands::Keys { prefix } => {
            let store = commands::open_read_only(&config)?;
            commands::cache::keys(&store, prefix.as_deref())?;
        }
        Commands::Inspect { key } => {
            let store = commands::open_read_only(&config)?;
            commands::cache::inspect(&store, &config.key_prefix, &key)?;
        }
        Commands::Clear {
            resource,
            components,
            all,
        } => {
            let larder = commands::open(config)?;
            match resource {
                Some(resource) if !all => {
                    commands::cache::clear(&larder, &resource, &components)?;
                }
                _ => commands::cache::clear_all(&larder)?,
            }
        }
        Commands::GuestId => commands::identity::guest_id(&commands::open(config)?),
        Commands::Show { resource, user } => {
            let larder = commands::open(config)?;
            commands::identity::show(&larder, resource, user.as_deref())?;
        }
        Commands::Migrate { user } => {
            commands::identity::migrate(&commands::open(config)?, &user)?;
        }
    }
    Ok(())
}
