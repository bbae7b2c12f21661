use std::io;

use anyhow::Result;
use clap::Args as ClapArgs;

use cfcrypt_core::{CryptFs, OpenOptions};

use super::{copy_out, normalize_path, with_handle};

#[derive(ClapArgs)]
pub struct Args {
    /// File path within the store
    pub file: String,
}

pub fn execute(fs: &CryptFs, args: Args) -> Result<()> {
    let path = normalize_path(&args.file);
    with_handle(fs, &path, OpenOptions::new(), |handle| {
        copy_out(fs, handle, 0, None, &mut io::stdout().lock())?;
        Ok(())
    })
}
