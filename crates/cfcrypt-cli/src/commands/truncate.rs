use anyhow::Result;
use clap::Args as ClapArgs;

use cfcrypt_core::{CryptFs, OpenOptions};

use super::{normalize_path, with_handle};

#[derive(ClapArgs)]
pub struct Args {
    /// File path within the store
    pub path: String,

    /// New plaintext size in bytes
    pub size: u64,
}

pub fn execute(fs: &CryptFs, args: Args) -> Result<()> {
    let path = normalize_path(&args.path);
    let options = OpenOptions::new().write(true);
    with_handle(fs, &path, options, |handle| {
        fs.truncate(handle, i64::try_from(args.size)?)?;
        Ok(())
    })
}
