//! Store maintenance binary: create a store, or open and cleanly close one
//! (which runs crash recovery if the last shutdown was unclean).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mvstore::data::DataManager;
use mvstore::transaction::TransactionManager;

/// Default page cache budget.
const DEFAULT_MEM: u64 = 64 << 20;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base path of the store; the .db/.log/.xid files derive from it
    #[arg(short, long)]
    path: PathBuf,

    /// Page cache budget in bytes
    #[arg(short, long, default_value_t = DEFAULT_MEM)]
    mem: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty store
    Init,
    /// Open the store (recovering if needed) and close it cleanly
    Check,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Init => {
            TransactionManager::create(&args.path)
                .context("failed to create transaction file")?;
            let dm = DataManager::create(&args.path, args.mem)
                .context("failed to create store files")?;
            dm.close().context("failed to close new store")?;
            println!("created store at {}", args.path.display());
        }
        Command::Check => {
            let tm = TransactionManager::open(&args.path)
                .context("failed to open transaction file")?;
            let dm = DataManager::open(&args.path, args.mem, &tm)
                .context("failed to open store")?;
            dm.close().context("failed to close store")?;
            println!("store at {} is consistent", args.path.display());
        }
    }
    Ok(())
}
