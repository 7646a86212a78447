//! Generates a long-term X25519 identity key pair for the coordinator or
//! a client, and prints the public key for distribution to the peer.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wgac-keygen", version, about = "Generate a wgac identity key pair")]
struct Args {
    /// Where to write the secret key. Refuses to overwrite an existing
    /// file unless `--force` is given.
    #[arg(long, default_value = "identity.key")]
    out: PathBuf,

    /// Overwrite `--out` if it already exists.
    #[arg(long)]
    force: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if args.out.exists() && !args.force {
        eprintln!("{:?} already exists, pass --force to overwrite", args.out);
        std::process::exit(1);
    }
    if args.out.exists() {
        std::fs::remove_file(&args.out)?;
    }

    let identity = wgac::keystore::load_or_generate(&args.out)?;
    println!("secret key written to {:?}", args.out);
    println!("public key (hex, share this with the peer): {}", hex::encode(identity.public_key()));
    Ok(())
}
