use std::error::Error;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use shmkv::{KvReader, KvWriter, ReaderConfig, StoreConfig, WriterConfig};

#[derive(Parser)]
#[clap(about = "Shared-memory key-value store")]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "kvctl.toml")]
    config: String,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the store unless it already exists
    Create,
    /// Remove the store
    Destroy,
    /// Append a value under a key
    Write { key: String, value: String },
    /// Print the next value of a key
    Read { key: String },
    /// Print every value of a key
    ReadAll { key: String },
    /// Write `count` values `<prefix>-<i>` under one key
    Load {
        #[clap(long)]
        count: usize,
        #[clap(long, default_value = "load")]
        key: String,
        #[clap(long, default_value = "value")]
        prefix: String,
    },
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct KvctlConfig {
    shmem: StoreConfig,
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let opts: Opts = Opts::parse();
    let cfg: KvctlConfig = confy::load_path(&opts.config)?;
    debug!(?cfg, "loaded config");
    let found = run(&cfg.shmem, opts.command)?;
    if !found {
        process::exit(1);
    }
    Ok(())
}

/// Returns false when a read found nothing.
fn run(cfg: &StoreConfig, command: Command) -> Result<bool, Box<dyn Error>> {
    let reader = || KvReader::new(&ReaderConfig { shmem: cfg.clone() });
    let writer = || KvWriter::new(&WriterConfig { shmem: cfg.clone() });
    match command {
        Command::Create => shmkv::create(cfg)?,
        Command::Destroy => shmkv::destroy(cfg)?,
        Command::Write { key, value } => writer().write(&key, &value)?,
        Command::Read { key } => match reader().read(&key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => {
                eprintln!("{}: not found", key);
                return Ok(false);
            }
        },
        Command::ReadAll { key } => match reader().read_all(&key)? {
            Some(values) => {
                for value in values {
                    println!("{}", String::from_utf8_lossy(&value));
                }
            }
            None => {
                eprintln!("{}: not found", key);
                return Ok(false);
            }
        },
        Command::Load { count, key, prefix } => load(&writer(), count, &key, &prefix)?,
    }
    Ok(true)
}

fn load(writer: &KvWriter, count: usize, key: &str, prefix: &str) -> Result<(), Box<dyn Error>> {
    // A signal only raises the flag, so the process never dies while holding the access gate.
    let closing = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&closing))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&closing))?;

    let mut written = 0;
    while written < count && !closing.load(Ordering::Relaxed) {
        writer.write(key, format!("{}-{}", prefix, written))?;
        written += 1;
    }
    info!(written, "load finished");
    Ok(())
}
