use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use cfcrypt_core::CryptFs;

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// File path within the store
    pub path: String,
}

pub fn execute(fs: &CryptFs, args: Args) -> Result<()> {
    let path = normalize_path(&args.path);
    let size = fs
        .plaintext_len(&path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let backing = fs.store().len(&path)?;
    let config = fs.config();

    println!("path:       {}", path.display());
    println!("size:       {size}");
    println!("backing:    {backing}");
    println!("blocks:     {}", config.layout().block_count(size));
    println!("block size: {}", config.plain_block_size);
    println!("cipher:     {}", config.cipher);
    Ok(())
}
