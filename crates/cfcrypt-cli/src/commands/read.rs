use std::io;

use anyhow::Result;
use clap::Args as ClapArgs;

use cfcrypt_core::{CryptFs, OpenOptions};

use super::{copy_out, normalize_path, with_handle};

#[derive(ClapArgs)]
pub struct Args {
    /// File path within the store
    pub file: String,

    /// Plaintext offset to start reading at
    #[arg(short, long, default_value_t = 0)]
    pub offset: u64,

    /// Maximum number of bytes to read (default: to end of file)
    #[arg(short, long)]
    pub length: Option<u64>,
}

pub fn execute(fs: &CryptFs, args: Args) -> Result<()> {
    let path = normalize_path(&args.file);
    with_handle(fs, &path, OpenOptions::new(), |handle| {
        let copied = copy_out(fs, handle, args.offset, args.length, &mut io::stdout().lock())?;
        tracing::debug!(copied, "Read range");
        Ok(())
    })
}
