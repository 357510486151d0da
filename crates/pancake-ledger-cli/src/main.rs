//! Pancake ledger CLI
//!
//! Thin wrapper around the kernel for inspecting a ledger database.
//!
//! ## Usage
//!
//! ```bash
//! # Check a packet file without touching a database
//! pancake validate packet.json
//!
//! # Ingest a packet (or a JSON array of packets), indexed under extra geoids
//! pancake ingest packet.json --geoid geo-field-b
//!
//! # Show a packet
//! pancake get 01J9Z8Y7X6W5V4T3S2R1Q0P9N8
//!
//! # Newest notes for one field, ten at a time
//! pancake query --geoid geo-field-a --type note --limit 10
//!
//! # Graph projection as NDJSON
//! pancake export --geoid geo-field-a > triples.ndjson
//!
//! # Ledgers
//! pancake ledger list --participant user-ana
//! pancake ledger show <ledger_id>
//! pancake ledger verify <ledger_id>
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use pancake_ledger::core::{canonical_len, parse_timestamp, validate_structure_within};
use pancake_ledger::store::SqliteStore;
use pancake_ledger::{
    GeoId, IngestResult, Kernel, KernelConfig, LedgerId, PacketId, PacketQuery,
    UnconfiguredResolver,
};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

type CliKernel = Kernel<SqliteStore, UnconfiguredResolver>;

/// Pancake ledger - verifiable field records
#[derive(Parser)]
#[command(name = "pancake")]
#[command(version)]
#[command(about = "Inspect and maintain a Pancake ledger database")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "PANCAKE_DB", default_value = "pancake.db")]
    db: PathBuf,

    /// Log filter (e.g. `debug`, `pancake_ledger=trace`). Overrides PANCAKE_LOG and RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check structure, integrity and size of a packet file
    Validate {
        /// Path to a packet JSON document
        file: PathBuf,
    },

    /// Store one packet, or a JSON array of packets
    Ingest {
        file: PathBuf,

        /// Additional geoid to index the packets under (repeatable)
        #[arg(long = "geoid")]
        geoids: Vec<String>,
    },

    /// Print a stored packet
    Get {
        id: String,
    },

    /// List packets newest first, one JSON document per line
    Query {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Write the triple projection of matching packets as NDJSON
    Export {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Ledger inspection
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// List ledgers
    List {
        /// Only ledgers this agent participates in
        #[arg(long)]
        participant: Option<String>,
    },

    /// Print a ledger root and its entries
    Show { id: String },

    /// Verify a ledger's hash chain and root summary
    Verify { id: String },
}

#[derive(Args)]
struct FilterArgs {
    /// Primary or secondary geoid
    #[arg(long)]
    geoid: Option<String>,

    /// Packet type
    #[arg(long = "type")]
    packet_type: Option<String>,

    /// Inclusive lower time bound (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    from: Option<DateTime<Utc>>,

    /// Inclusive upper time bound (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    to: Option<DateTime<Utc>>,

    /// Case-insensitive text match
    #[arg(long)]
    keyword: Option<String>,

    /// Page size
    #[arg(long, default_value_t = 50)]
    limit: i64,

    /// Continue after this packet id
    #[arg(long)]
    cursor: Option<String>,
}

impl FilterArgs {
    fn to_query(&self) -> Result<PacketQuery> {
        Ok(PacketQuery {
            geoid: self.geoid.clone().map(GeoId::new),
            packet_type: self.packet_type.clone(),
            time_from: self.from,
            time_to: self.to,
            keyword: self.keyword.clone(),
            thread_ids: None,
            limit: self.limit,
            cursor: self.cursor.as_deref().map(parse_packet_id).transpose()?,
        })
    }
}

fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_timestamp(s).ok_or_else(|| format!("'{}' is not an RFC 3339 timestamp", s))
}

fn parse_packet_id(s: &str) -> Result<PacketId> {
    PacketId::from_string(s).with_context(|| format!("invalid packet id '{}'", s))
}

fn parse_ledger_id(s: &str) -> Result<LedgerId> {
    LedgerId::from_string(s).with_context(|| format!("invalid ledger id '{}'", s))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Set up logging on stderr so stdout stays machine-readable.
fn setup_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_env("PANCAKE_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_kernel(db: &Path, config: KernelConfig) -> Result<CliKernel> {
    let store = SqliteStore::open(db).with_context(|| format!("opening {}", db.display()))?;
    Ok(Kernel::new(store, UnconfiguredResolver, config))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref());

    let config = KernelConfig::from_env()?;
    debug!(?config, db = %cli.db.display(), "starting");

    match cli.command {
        Commands::Validate { file } => {
            let raw = read_json(&file)?;
            let packet = validate_structure_within(&raw, config.max_body_bytes)?;
            if packet.observed_at().is_none() {
                bail!("Header.timestamp '{}' is not a valid timestamp", packet.header.timestamp);
            }
            let size = canonical_len(&packet.body);
            println!(
                "valid: {} ({} bytes, hash {})",
                packet.id(),
                size,
                packet.footer.hash
            );
        }

        Commands::Ingest { file, geoids } => {
            let kernel = open_kernel(&cli.db, config)?;
            let extra: Vec<GeoId> = geoids.into_iter().map(GeoId::new).collect();
            let packets = match read_json(&file)? {
                Value::Array(items) => items,
                single => vec![single],
            };

            let mut rejected = 0;
            for (index, raw) in packets.iter().enumerate() {
                match kernel.ingest(raw, &extra).await {
                    Ok(IngestResult::Accepted(id)) => println!("accepted {}", id),
                    Ok(IngestResult::Duplicate) => println!("duplicate #{}", index),
                    Ok(IngestResult::Conflict { existing }) => {
                        rejected += 1;
                        println!("conflict #{}: stored packet has hash {}", index, existing);
                    }
                    Err(e) => {
                        rejected += 1;
                        println!("rejected #{}: {}", index, e);
                    }
                }
            }
            if rejected > 0 {
                bail!("{} of {} packets not stored", rejected, packets.len());
            }
        }

        Commands::Get { id } => {
            let kernel = open_kernel(&cli.db, config)?;
            let id = parse_packet_id(&id)?;
            let Some(packet) = kernel.get_packet(&id).await? else {
                bail!("packet not found: {}", id);
            };
            let geoids = kernel.packet_geoids(&id).await?;

            let mut out = packet.to_value();
            if !geoids.is_empty() {
                out["secondary_geoids"] = json!(geoids);
            }
            print_json(&out)?;
        }

        Commands::Query { filter } => {
            let kernel = open_kernel(&cli.db, config)?;
            let page = kernel.query_packets(&filter.to_query()?).await?;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for packet in &page.items {
                serde_json::to_writer(&mut out, &packet.to_value())?;
                writeln!(out)?;
            }
            if let Some(cursor) = page.next_cursor {
                eprintln!("next cursor: {}", cursor);
            }
        }

        Commands::Export { filter } => {
            let kernel = open_kernel(&cli.db, config)?;
            let stdout = io::stdout();
            let written = kernel.export_triples(&filter.to_query()?, stdout.lock()).await?;
            eprintln!("{} triples", written);
        }

        Commands::Ledger { action } => {
            let kernel = open_kernel(&cli.db, config)?;
            match action {
                LedgerAction::List { participant } => {
                    for ledger in kernel.list_ledgers(participant.as_deref()).await? {
                        println!(
                            "{}  {:<12} {:<8} {:>4} entries  {}",
                            ledger.ledger_id,
                            ledger.ledger_type,
                            if ledger.is_archived() { "archived" } else { "active" },
                            ledger.counters.packet_count,
                            ledger.primary_location.geoid
                        );
                    }
                }
                LedgerAction::Show { id } => {
                    let id = parse_ledger_id(&id)?;
                    let Some(ledger) = kernel.get_ledger(&id).await? else {
                        bail!("ledger not found: {}", id);
                    };
                    let entries = kernel.ledger_entries(&id).await?;
                    print_json(&json!({ "ledger": ledger, "entries": entries }))?;
                }
                LedgerAction::Verify { id } => {
                    let id = parse_ledger_id(&id)?;
                    let count = kernel.verify_ledger(&id).await?;
                    println!("ok: {} entries verified", count);
                }
            }
        }
    }

    Ok(())
}
