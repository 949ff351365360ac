//! `blobctl`: command-line front end for the encrypted object store.
//!
//! Startup sequence:
//! 1. Parse arguments.
//! 2. Load and validate [`Config`] from environment variables.
//! 3. Initialise structured logging.
//! 4. For store commands, connect to S3 and make sure the bucket exists.
//! 5. Run the command; results go to stdout, logs to stderr.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blobstore::{telemetry, Config, DecryptWith, ObjectStoreClient};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use common::{Payload, Whitelist};
use crypt::{KeyRing, PayloadCodec};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "blobctl", version, about = "Client-side encrypted S3 object store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encrypt a file and upload it.
    Upload {
        key: String,
        /// Local file to upload; `-` reads stdin.
        file: PathBuf,
        /// Object tags in `k1=v1&k2=v2` form.
        #[arg(long)]
        tags: Option<String>,
    },
    /// Download and decrypt an object.
    Download {
        key: String,
        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Decrypt with PREVIOUS_ENCRYPTION_KEY only.
        #[arg(long, conflicts_with = "any_key")]
        previous_key: bool,
        /// Try ENCRYPTION_KEY, then PREVIOUS_ENCRYPTION_KEY.
        #[arg(long)]
        any_key: bool,
    },
    /// List keys under a prefix, optionally within a last-modified window.
    List {
        #[arg(default_value = "")]
        prefix: String,
        /// RFC 3339 lower bound, inclusive.
        #[arg(long, requires = "until")]
        since: Option<DateTime<Utc>>,
        /// RFC 3339 upper bound, inclusive.
        #[arg(long, requires = "since")]
        until: Option<DateTime<Utc>>,
    },
    /// Copy an object within the bucket.
    Copy { source: String, target: String },
    /// Delete an object and wait until it is gone.
    Delete { key: String },
    /// Exit 0 if any object exists under the prefix, 1 otherwise.
    Exists { prefix: String },
    /// Encrypt the non-whitelisted fields of a JSON object read from stdin.
    Seal {
        /// Comma-separated fields kept in plaintext.
        #[arg(long, value_delimiter = ',')]
        whitelist: Vec<String>,
    },
    /// Decrypt a sealed JSON object read from stdin. Falls back to
    /// PREVIOUS_ENCRYPTION_KEY when it is set.
    Unseal,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = Config::from_env().map_err(|e| {
        // Logging is not up yet.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    telemetry::init_tracing(&cfg.log_level)?;
    info!(version = env!("CARGO_PKG_VERSION"), bucket = %cfg.s3_bucket, "blobctl starting");

    match cli.command {
        Command::Seal { whitelist } => seal(&cfg, whitelist.into_iter().collect()),
        Command::Unseal => unseal(&cfg),
        command => run_store_command(&cfg, command).await,
    }
}

async fn run_store_command(cfg: &Config, command: Command) -> Result<()> {
    let client = ObjectStoreClient::connect(cfg).await?;

    match command {
        Command::Upload { key, file, tags } => {
            let contents = read_input(&file)?;
            let location = client.upload(&key, &contents, tags.as_deref()).await?;
            println!("{location}");
        }
        Command::Download {
            key,
            out,
            previous_key,
            any_key,
        } => {
            let plaintext = if previous_key {
                let previous = previous_codec(cfg)?;
                client.download(&key, DecryptWith::Fallback(&previous)).await?
            } else if any_key {
                let ring = KeyRing::rotating(cfg.encryption_key.codec()?, previous_codec(cfg)?);
                client.download(&key, DecryptWith::Ring(&ring)).await?
            } else {
                client.download(&key, DecryptWith::Primary).await?
            };
            write_output(out.as_deref(), &plaintext)?;
        }
        Command::List {
            prefix,
            since,
            until,
        } => {
            let keys = match since.zip(until) {
                Some((start, end)) => {
                    client
                        .list_objects_in_time_window(&prefix, start, end)
                        .await?
                }
                None => client.list_objects(&prefix).await?,
            };
            for key in keys {
                println!("{key}");
            }
        }
        Command::Copy { source, target } => client.copy_object(&source, &target).await?,
        Command::Delete { key } => client.delete_object(&key).await?,
        Command::Exists { prefix } => {
            if !client.exists(&prefix).await? {
                std::process::exit(1);
            }
        }
        other @ (Command::Seal { .. } | Command::Unseal) => {
            anyhow::bail!("{other:?} does not use the object store")
        }
    }
    Ok(())
}

fn seal(cfg: &Config, whitelist: Whitelist) -> Result<()> {
    let codec = PayloadCodec::new(cfg.encryption_key.codec()?);
    let payload = read_payload()?;
    let sealed = codec.encrypt_payload(&payload, &whitelist)?;
    print_payload(&sealed)
}

fn unseal(cfg: &Config) -> Result<()> {
    let current = cfg.encryption_key.codec()?;
    let keys = match &cfg.previous_encryption_key {
        Some(previous) => KeyRing::rotating(current, previous.codec()?),
        None => KeyRing::new(current),
    };
    let codec = PayloadCodec::with_ring(keys);
    let payload = read_payload()?;
    let opened = codec.decrypt_payload(&payload)?;
    print_payload(&opened)
}

fn previous_codec(cfg: &Config) -> Result<crypt::CipherCodec> {
    let previous = cfg
        .previous_encryption_key
        .as_ref()
        .context("PREVIOUS_ENCRYPTION_KEY is not set")?;
    Ok(previous.codec()?)
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_output(path: Option<&Path>, contents: &[u8]) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display())),
        None => std::io::stdout()
            .write_all(contents)
            .context("failed to write stdout"),
    }
}

fn read_payload() -> Result<Payload> {
    let input = read_input(Path::new("-"))?;
    serde_json::from_slice(&input).context("stdin is not a JSON object")
}

fn print_payload(payload: &Payload) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}
