use std::io::{self, Read};

use anyhow::Result;
use clap::Args as ClapArgs;

use cfcrypt_core::{CryptFs, OpenOptions};

use super::{normalize_path, with_handle};

#[derive(ClapArgs)]
pub struct Args {
    /// File path within the store
    pub path: String,

    /// Plaintext offset to write at; gaps past the end read back as zeros
    #[arg(short, long)]
    pub offset: u64,

    /// Fail if the file does not exist yet
    #[arg(long)]
    pub no_create: bool,
}

pub fn execute(fs: &CryptFs, args: Args) -> Result<()> {
    let path = normalize_path(&args.path);

    let mut data = Vec::new();
    io::stdin().read_to_end(&mut data)?;

    let options = OpenOptions::read_write_create().create(!args.no_create);
    with_handle(fs, &path, options, |handle| {
        let written = fs.write(handle, i64::try_from(args.offset)?, &data)?;
        eprintln!("Wrote {written} bytes at offset {}", args.offset);
        Ok(())
    })
}
