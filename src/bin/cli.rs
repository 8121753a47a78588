//! mcharness CLI
//!
//! Issue single commands against a memcache server or proxy, and render
//! proxy configs with substituted ports.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mcharness::client::{AsciiClient, BinaryClient};
use mcharness::template::{render_config_file, PortSubstitution};
use mcharness::{ClientConfig, Endpoint, McError, ResponseRecord, Result, StoreOptions};
use tracing_subscriber::{fmt, EnvFilter};

/// mcharness CLI
#[derive(Parser, Debug)]
#[command(name = "mcharness-cli")]
#[command(about = "Drive a memcache server or proxy from the command line")]
#[command(version)]
struct Args {
    /// Server address: host:port, a bare port, or unix:<path>
    #[arg(short, long, default_value = "127.0.0.1:11211")]
    server: String,

    /// Speak the binary protocol instead of the line protocol
    #[arg(short, long)]
    binary: bool,

    /// Connect timeout in milliseconds
    #[arg(long, default_value = "1000")]
    connect_timeout_ms: u64,

    /// Connect attempts while the server refuses connections
    #[arg(long, default_value = "1")]
    connect_attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get one or more keys
    Get {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Get one or more keys with their CAS tokens
    Gets {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Store a value unconditionally
    Set(StoreArgs),

    /// Store only if the key is absent
    Add(StoreArgs),

    /// Store only if the key is present
    Replace(StoreArgs),

    /// Append to an existing value
    Append(StoreArgs),

    /// Prepend to an existing value
    Prepend(StoreArgs),

    /// Delete a key
    Delete {
        key: String,

        #[arg(long)]
        noreply: bool,
    },

    /// Update a key's expiry
    Touch {
        key: String,

        #[arg(allow_negative_numbers = true)]
        exptime: i64,
    },

    /// Increment a counter
    Incr { key: String, delta: u64 },

    /// Decrement a counter
    Decr { key: String, delta: u64 },

    /// Dump server statistics
    Stats {
        /// Statistics group, e.g. "items" or "slabs"
        group: Option<String>,
    },

    /// Print the server version
    Version,

    /// Invalidate every item
    Flush {
        /// Delay in seconds
        delay: Option<u32>,
    },

    /// Render a JSON config with placeholders and ports substituted
    RewriteConfig {
        /// Config file to render
        src: PathBuf,

        /// Directory the rendered file is written to
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Replacement ports in first-seen order (comma separated)
        #[arg(long, value_delimiter = ',', conflicts_with = "map")]
        ports: Vec<u16>,

        /// Explicit OLD=NEW port mapping (repeatable)
        #[arg(long, value_parser = parse_port_pair)]
        map: Vec<(u32, u16)>,

        /// PLACEHOLDER=VALUE literal substitution (repeatable)
        #[arg(long = "set", value_parser = parse_placeholder)]
        placeholders: Vec<(String, String)>,
    },
}

#[derive(clap::Args, Debug)]
struct StoreArgs {
    key: String,
    value: String,

    #[arg(long, default_value = "0")]
    flags: u32,

    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    exptime: i64,

    #[arg(long)]
    noreply: bool,
}

impl StoreArgs {
    fn options(&self) -> StoreOptions {
        let options = StoreOptions::default()
            .with_flags(self.flags)
            .with_exptime(self.exptime);
        if self.noreply {
            options.noreply()
        } else {
            options
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mcharness=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    if let Commands::RewriteConfig {
        src,
        out_dir,
        ports,
        map,
        placeholders,
    } = &args.command
    {
        let substitution = if !map.is_empty() {
            Some(PortSubstitution::Map(map.iter().copied().collect()))
        } else if !ports.is_empty() {
            Some(PortSubstitution::List(ports.clone()))
        } else {
            None
        };
        let dest = render_config_file(src, out_dir, placeholders.iter().cloned(), substitution.as_ref())?;
        println!("{}", dest.display());
        return Ok(());
    }

    let config = ClientConfig::builder()
        .endpoint(Endpoint::parse(&args.server)?)
        .connect_timeout_ms(args.connect_timeout_ms)
        .connect_attempts(args.connect_attempts)
        .build()?;
    tracing::debug!("mcharness-cli v{} -> {}", mcharness::VERSION, config.endpoint);

    if args.binary {
        run_binary(&config, args.command)
    } else {
        run_ascii(&config, args.command)
    }
}

fn run_ascii(config: &ClientConfig, command: Commands) -> Result<()> {
    let mut client = AsciiClient::connect(config)?;
    match command {
        Commands::Get { keys } => print_records(client.get_multi(&borrowed(&keys))?, &keys),
        Commands::Gets { keys } => print_records(client.gets_multi(&borrowed(&keys))?, &keys),
        Commands::Set(a) => println!("{:?}", client.set(&a.key, &a.value, a.options())?),
        Commands::Add(a) => println!("{:?}", client.add(&a.key, &a.value, a.options())?),
        Commands::Replace(a) => println!("{:?}", client.replace(&a.key, &a.value, a.options())?),
        Commands::Append(a) => println!("{:?}", client.append(&a.key, &a.value, a.options())?),
        Commands::Prepend(a) => println!("{:?}", client.prepend(&a.key, &a.value, a.options())?),
        Commands::Delete { key, noreply } => println!("{:?}", client.delete(&key, None, noreply)?),
        Commands::Touch { key, exptime } => println!("{:?}", client.touch(&key, exptime, false)?),
        Commands::Incr { key, delta } => print_counter(client.incr(&key, delta, false)?),
        Commands::Decr { key, delta } => print_counter(client.decr(&key, delta, false)?),
        Commands::Stats { group } => match client.stats(group.as_deref())? {
            Some(stats) => print_stats(stats),
            None => println!("(no stats)"),
        },
        Commands::Version => println!("{}", client.version()?),
        Commands::Flush { delay } => println!("{:?}", client.flush_all(delay)?),
        Commands::RewriteConfig { .. } => {}
    }
    Ok(())
}

fn run_binary(config: &ClientConfig, command: Commands) -> Result<()> {
    let mut client = BinaryClient::connect(config)?;
    match command {
        Commands::Get { keys } | Commands::Gets { keys } => {
            print_records(client.get_multi(&borrowed(&keys))?, &keys)
        }
        Commands::Set(a) => println!("{:?}", client.set(&a.key, &a.value, a.options())?),
        Commands::Add(a) => println!("{:?}", client.add(&a.key, &a.value, a.options())?),
        Commands::Replace(a) => println!("{:?}", client.replace(&a.key, &a.value, a.options())?),
        Commands::Append(a) => println!("{:?}", client.append(&a.key, &a.value, a.noreply)?),
        Commands::Prepend(a) => println!("{:?}", client.prepend(&a.key, &a.value, a.noreply)?),
        Commands::Delete { key, noreply } => println!("{:?}", client.delete(&key, noreply)?),
        Commands::Touch { key, exptime } => println!("{:?}", client.touch(&key, exptime)?),
        Commands::Incr { key, delta } => print_counter(client.incr(&key, delta)?),
        Commands::Decr { key, delta } => print_counter(client.decr(&key, delta)?),
        Commands::Stats { group } => print_stats(client.stats(group.as_deref())?),
        Commands::Version => println!("{}", client.version()?),
        Commands::Flush { delay } => println!("{:?}", client.flush_all(delay)?),
        Commands::RewriteConfig { .. } => {}
    }
    Ok(())
}

fn borrowed(keys: &[String]) -> Vec<&str> {
    keys.iter().map(String::as_str).collect()
}

fn print_records(mut records: HashMap<String, Option<ResponseRecord>>, keys: &[String]) {
    for key in keys {
        match records.remove(key).flatten() {
            Some(record) => match record.cas {
                Some(cas) => println!("{} flags={} cas={} {}", key, record.flags, cas, record.value_str()),
                None => println!("{} flags={} {}", key, record.flags, record.value_str()),
            },
            None => println!("{} (miss)", key),
        }
    }
}

fn print_counter(value: Option<u64>) {
    match value {
        Some(v) => println!("{}", v),
        None => println!("(miss)"),
    }
}

fn print_stats(stats: HashMap<String, String>) {
    let mut names: Vec<_> = stats.into_iter().collect();
    names.sort();
    for (name, value) in names {
        println!("{} {}", name, value);
    }
}

fn parse_port_pair(s: &str) -> std::result::Result<(u32, u16), String> {
    let (old, new) = s
        .split_once('=')
        .ok_or_else(|| format!("expected OLD=NEW, got {:?}", s))?;
    let old = old.parse().map_err(|e| format!("bad port {:?}: {}", old, e))?;
    let new = new.parse().map_err(|e| format!("bad port {:?}: {}", new, e))?;
    Ok((old, new))
}

fn parse_placeholder(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(McError::InvalidArgument(format!("expected PLACEHOLDER=VALUE, got {:?}", s)).to_string()),
    }
}
