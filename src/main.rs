//! verkv console
//!
//! Opens a store and runs a small line-oriented console on stdin, mostly
//! useful for poking at the command layer by hand.

use bytes::Bytes;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use verkv::storage::{mint_version, MetaData, SetOpt, Status, ValueItem, Version};
use verkv::{Config, Storage};

/// Parse configuration from command-line arguments
fn config_from_args() -> Config {
    let mut config = Config::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" | "-d" => {
                config.data_dir = PathBuf::from(flag_value(&args, i));
                i += 2;
            }
            "--cache-size" => {
                config.cache_size = parse_flag(&args, i);
                i += 2;
            }
            "--write-buffer-size" => {
                config.write_buffer_size = parse_flag(&args, i);
                i += 2;
            }
            "--shards" | "-s" => {
                config.shard_count = parse_flag(&args, i);
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("verkv version {}", verkv::VERSION);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    config
}

fn flag_value(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", args[i]);
            std::process::exit(1);
        }
    }
}

fn parse_flag(args: &[String], i: usize) -> usize {
    flag_value(args, i).parse().unwrap_or_else(|_| {
        eprintln!("Error: {} expects a number", args[i]);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
verkv - A versioned command layer over a multi-type key-value engine

USAGE:
    verkv [OPTIONS]

OPTIONS:
    -d, --data-dir <DIR>              Engine data directory (default: ./data)
        --cache-size <BYTES>          Engine cache size (default: 67108864)
        --write-buffer-size <BYTES>   Engine write buffer size (default: 4194304)
    -s, --shards <N>                  Key-lock shard count (default: 64)
    -v, --version                     Print version information
    -h, --help                        Print this help message

CONSOLE:
    set <key> <value> [seconds]
    get <key>
    del <key> [key ...]
    expire <key> <seconds>
    ttl <key>
    persist <key>
    exists <key>
    type <key>

Logging is controlled with RUST_LOG (default: info).
"#
    );
}

/// Runs one console line and renders the result.
fn execute(storage: &Storage, line: &str) -> String {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((cmd, args)) = parts.split_first() else {
        return String::new();
    };
    let key = |i: usize| Bytes::copy_from_slice(args[i].as_bytes());

    match (cmd.to_ascii_lowercase().as_str(), args.len()) {
        ("set", 2) => {
            let item = ValueItem::new(key(1), mint_version());
            storage
                .set(&key(0), item, &MetaData::default(), SetOpt::Exist)
                .to_string()
        }
        ("set", 3) => match args[2].parse::<u64>() {
            Ok(seconds) => {
                let item = ValueItem::new(key(1), mint_version());
                storage.set_ex(&key(0), item, seconds).to_string()
            }
            Err(_) => Status::NotANumber.to_string(),
        },
        ("get", 1) => {
            let (status, item) = storage.get(&key(0));
            if status == Status::Ok {
                format!(
                    "\"{}\" (version {})",
                    String::from_utf8_lossy(&item.value),
                    item.version
                )
            } else {
                status.to_string()
            }
        }
        ("del", n) if n > 0 => {
            let keys: Vec<Bytes> = (0..n).map(key).collect();
            let versions = vec![Version::ZERO; n];
            let (status, per_key) = storage.del(&keys, &versions, &MetaData::default());
            let deleted = per_key.iter().filter(|s| **s == Status::Ok).count();
            format!("{} deleted={}", status, deleted)
        }
        ("expire", 2) => match args[1].parse::<u64>() {
            Ok(seconds) => storage.expire(&key(0), seconds, mint_version()).to_string(),
            Err(_) => Status::NotANumber.to_string(),
        },
        ("ttl", 1) => {
            let (status, seconds) = storage.ttl(&key(0));
            if status == Status::Ok {
                format!("{}s", seconds)
            } else {
                status.to_string()
            }
        }
        ("persist", 1) => storage.persist(&key(0), mint_version()).to_string(),
        ("exists", 1) => storage.exists(&key(0)).to_string(),
        ("type", 1) => match storage.key_type(&key(0)) {
            (_, Some(kind)) => kind.to_string(),
            (status, None) => status.to_string(),
        },
        _ => Status::WrongArgCount.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let storage: Storage = Storage::open(config)?;
    println!("verkv v{} - type `help` for commands, Ctrl+D to exit", verkv::VERSION);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.eq_ignore_ascii_case("help") {
                    print_help();
                } else if !line.is_empty() {
                    println!("{}", execute(&storage, line));
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let status = storage.close().await;
    info!(status = %status, "Shutdown complete");
    Ok(())
}
