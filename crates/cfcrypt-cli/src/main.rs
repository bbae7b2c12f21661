#![forbid(unsafe_code)]

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cfcrypt_core::{CipherSuite, CryptConfig, CryptFs, DEFAULT_PLAIN_BLOCK_SIZE, LocalStore, MasterKey};

use crate::commands::{cat, put, read, rm, stat, truncate, verify, write_at};

#[derive(Parser)]
#[command(name = "cfcrypt")]
#[command(author, version, about = "Command-line tool for cfcrypt encrypted stores")]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the encrypted objects
    #[arg(long, env = "CFCRYPT_STORE", global = true)]
    store: Option<PathBuf>,

    /// Master key as 64 hex characters (prefer the CFCRYPT_KEY env var)
    #[arg(long, env = "CFCRYPT_KEY", hide_env_values = true, global = true)]
    key: Option<String>,

    /// Plaintext bytes per block; must match the value the store was written with
    #[arg(long, env = "CFCRYPT_BLOCK_SIZE", default_value_t = DEFAULT_PLAIN_BLOCK_SIZE, global = true)]
    block_size: usize,

    /// Block cipher: aes-256-gcm or xchacha20-poly1305
    #[arg(long, env = "CFCRYPT_CIPHER", default_value = "aes-256-gcm", global = true)]
    cipher: CipherSuite,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write stdin to a file, replacing its contents
    Put(put::Args),

    /// Decrypt a file to stdout
    Cat(cat::Args),

    /// Decrypt a byte range to stdout
    Read(read::Args),

    /// Write stdin at an offset, growing the file if needed
    WriteAt(write_at::Args),

    /// Set the plaintext size of a file
    Truncate(truncate::Args),

    /// Show plaintext and backing sizes
    Stat(stat::Args),

    /// Remove a file
    Rm(rm::Args),

    /// Authenticate every block of a file
    Verify(verify::Args),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let store_path = cli
        .store
        .ok_or_else(|| anyhow::anyhow!("--store is required (or set CFCRYPT_STORE)"))?;
    let hex_key = cli
        .key
        .ok_or_else(|| anyhow::anyhow!("--key is required (or set CFCRYPT_KEY)"))?;
    let master_key = MasterKey::from_hex(&hex_key).context("Invalid master key")?;

    let store = LocalStore::open(&store_path)
        .with_context(|| format!("Failed to open store: {}", store_path.display()))?;
    let config = CryptConfig::default()
        .plain_block_size(cli.block_size)
        .cipher(cli.cipher);
    let fs = CryptFs::new(Arc::new(store), master_key, config)
        .context("Invalid store configuration")?;

    match cli.command {
        Commands::Put(args) => put::execute(&fs, args),
        Commands::Cat(args) => cat::execute(&fs, args),
        Commands::Read(args) => read::execute(&fs, args),
        Commands::WriteAt(args) => write_at::execute(&fs, args),
        Commands::Truncate(args) => truncate::execute(&fs, args),
        Commands::Stat(args) => stat::execute(&fs, args),
        Commands::Rm(args) => rm::execute(&fs, args),
        Commands::Verify(args) => verify::execute(&fs, args),
    }
}
