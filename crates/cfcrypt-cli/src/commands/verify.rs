use anyhow::{Result, bail};
use clap::Args as ClapArgs;

use cfcrypt_core::CryptFs;

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// Files to verify
    #[arg(required = true)]
    pub paths: Vec<String>,
}

pub fn execute(fs: &CryptFs, args: Args) -> Result<()> {
    let mut failures = 0usize;
    for raw in &args.paths {
        let path = normalize_path(raw);
        match fs.verify(&path) {
            Ok(report) => println!(
                "ok      {} ({} bytes, {} blocks, {} holes)",
                path.display(),
                report.size,
                report.blocks,
                report.holes
            ),
            Err(e) if e.is_integrity_violation() => {
                println!("FAILED  {}: {e}", path.display());
                failures += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if failures > 0 {
        bail!("{failures} file(s) failed verification");
    }
    Ok(())
}
