//! forge admin CLI.
//!
//! Subcommands: `list`, `stats`, `backup [--all | DATABASE] [--name N]`,
//! `restore --backup P [--database D]`, `cleanup db --days N [--execute]`,
//! `serve [--addr A]`. Exit code 0 on success, 1 on failure.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(about = "forge — administer the persisted stores or run the server")]
struct Args {
    /// Base directory holding the stores (default: current directory)
    #[arg(long, value_name = "DIR", global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all persisted stores
    List,
    /// Aggregate statistics over all stores
    Stats,
    /// Create a backup of one store (or all with --all)
    Backup {
        /// Store to back up (see `list`)
        database: Option<String>,
        /// Back up every discovered store
        #[arg(long)]
        all: bool,
        /// Backup directory name (default: <store>_<timestamp>)
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
    },
    /// Restore a store from a backup directory
    Restore {
        /// Path to the backup directory
        #[arg(long, value_name = "PATH")]
        backup: PathBuf,
        /// Restore over this store instead of the recorded original
        #[arg(long, value_name = "DB")]
        database: Option<String>,
    },
    /// Delete old records (dry-run unless --execute)
    Cleanup {
        /// What to clean; currently only `db` (conversations)
        target: String,
        /// Age threshold in days
        #[arg(long, default_value_t = 30)]
        days: i64,
        /// Actually delete instead of listing
        #[arg(long)]
        execute: bool,
    },
    /// Run the HTTP/SSE server
    Serve {
        /// Listen address (default 127.0.0.1:8090)
        #[arg(long, value_name = "ADDR")]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let base = cli::base_dir(args.base_dir);
    let admin = cli::admin(&base);

    let result = match args.cmd {
        Command::List => cli::cmd_list(&admin),
        Command::Stats => cli::cmd_stats(&admin),
        Command::Backup {
            database,
            all,
            name,
        } => cli::cmd_backup(&admin, all, database.as_deref(), name.as_deref()),
        Command::Restore { backup, database } => {
            cli::cmd_restore(&admin, &backup, database.as_deref())
        }
        Command::Cleanup {
            target,
            days,
            execute,
        } => {
            if target != "db" {
                Err(format!("unknown cleanup target: {}", target))
            } else {
                cli::cmd_cleanup(&admin, days, execute)
            }
        }
        Command::Serve { addr } => serve::run_serve(addr.as_deref())
            .await
            .map_err(|e| e.to_string()),
    };

    if let Err(message) = result {
        eprintln!("error: {}", message);
        std::process::exit(1);
    }
}
