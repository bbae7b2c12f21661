use std::io::{self, Read};

use anyhow::Result;
use clap::Args as ClapArgs;

use cfcrypt_core::{CryptFs, OpenOptions};

use super::{normalize_path, with_handle};

#[derive(ClapArgs)]
pub struct Args {
    /// Destination path in the store
    pub path: String,

    /// Append to the file instead of overwriting
    #[arg(short, long)]
    pub append: bool,
}

pub fn execute(fs: &CryptFs, args: Args) -> Result<()> {
    let path = normalize_path(&args.path);

    let mut content = Vec::new();
    io::stdin().read_to_end(&mut content)?;

    let options = OpenOptions::read_write_create().truncate(!args.append);
    with_handle(fs, &path, options, |handle| {
        let offset = if args.append { fs.file_size(handle)? } else { 0 };
        fs.write(handle, i64::try_from(offset)?, &content)?;
        Ok(())
    })
}
