use anyhow::{Result, bail};
use clap::Args as ClapArgs;

use cfcrypt_core::{CryptError, CryptFs};

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// Path to remove
    pub path: String,

    /// Ignore nonexistent files
    #[arg(short, long)]
    pub force: bool,
}

pub fn execute(fs: &CryptFs, args: Args) -> Result<()> {
    let path = normalize_path(&args.path);
    match fs.remove(&path) {
        Ok(()) => Ok(()),
        Err(CryptError::NotFound(_)) if args.force => Ok(()),
        Err(CryptError::NotFound(_)) => bail!("Path not found: {}", path.display()),
        Err(e) => Err(e.into()),
    }
}
