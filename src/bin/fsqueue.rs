//! fsqueue CLI: operator interface to a queue directory.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use fsqueue::codec::TYPE_HEADER;
use fsqueue::config::{Config, TransportConfig};
use fsqueue::telemetry::{TelemetryConfig, init_telemetry};
use fsqueue::{Envelope, JsonCodec, MessageId, MessageStore, Status, Transport};

#[derive(Parser)]
#[command(name = "fsqueue", about = "Durable filesystem message queue")]
struct Cli {
    /// TOML file with `directory` and `log`. Falls back to FSQUEUE_DIRECTORY / FSQUEUE_LOG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a JSON message
    Send {
        /// Message body as JSON
        json: String,
    },
    /// List pending messages, oldest first
    List,
    /// Show the head of the queue without removing it
    Peek,
    /// Show one pending message
    Show {
        id: String,
    },
    /// Acknowledge (delete, log as processed) a message
    Ack {
        id: String,
    },
    /// Reject (delete, log as failed) a message
    Reject {
        id: String,
    },
    /// Print and ack messages as they arrive
    Consume {
        /// Poll interval when the queue is empty
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
        /// Exit once the queue is empty instead of polling
        #[arg(long)]
        once: bool,
    },
    /// Print the outcome log for one status and day
    History {
        /// processed | failed
        status: String,
        /// Day to read, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Remove temporary files left by producers that died mid-write
    Sweep {
        #[arg(long, default_value_t = 3600)]
        older_than_secs: u64,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (transport_config, log_level) = match cli.config {
        Some(ref path) => (TransportConfig::from_toml_file(path)?, default_log_level()),
        None => {
            let config = Config::from_env()?;
            (config.transport, config.log_level)
        }
    };

    init_telemetry(TelemetryConfig {
        default_filter: log_level,
        compact: true,
    })?;

    let transport = Transport::open(&transport_config, JsonCodec::<serde_json::Value>::new())?;

    match cli.command {
        Command::Send { json } => cmd_send(&transport, &json),
        Command::List => cmd_list(transport.store()),
        Command::Peek => cmd_peek(transport.store()),
        Command::Show { id } => cmd_show(transport.store(), &id),
        Command::Ack { id } => cmd_finalize(transport.store(), &id, Status::Processed),
        Command::Reject { id } => cmd_finalize(transport.store(), &id, Status::Failed),
        Command::Consume { poll_ms, once } => {
            cmd_consume(&transport, Duration::from_millis(poll_ms), once)
        }
        Command::History { status, date } => cmd_history(transport.store(), &status, date),
        Command::Sweep { older_than_secs } => {
            let removed = transport
                .store()
                .sweep_incomplete(Duration::from_secs(older_than_secs))?;
            println!("Removed {removed} incomplete write(s).");
            Ok(())
        }
    }
}

fn default_log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

type JsonTransport = Transport<JsonCodec<serde_json::Value>>;

fn cmd_send(transport: &JsonTransport, json: &str) -> anyhow::Result<()> {
    let message: serde_json::Value = serde_json::from_str(json)?;
    let sent = transport.send(Envelope::new(message))?;
    if let Some(id) = sent.id() {
        println!("Enqueued: {id}");
    }
    Ok(())
}

fn cmd_list(store: &MessageStore) -> anyhow::Result<()> {
    let pending = store.reader().ordered()?;

    if pending.is_empty() {
        println!("No pending messages.");
        return Ok(());
    }

    println!("{:<42}  MODIFIED", "ID");
    println!("{}", "-".repeat(70));
    for message in &pending {
        let modified: chrono::DateTime<Local> = message.modified.into();
        println!(
            "{:<42}  {}",
            message.id,
            modified.format("%Y-%m-%d %H:%M:%S%.3f")
        );
    }

    println!("\n{} message(s)", pending.len());
    Ok(())
}

fn cmd_peek(store: &MessageStore) -> anyhow::Result<()> {
    match store.reader().next()? {
        Some((id, record)) => {
            println!("ID:       {id}");
            print_record(&record)?;
        }
        None => println!("Queue is empty."),
    }
    Ok(())
}

fn cmd_show(store: &MessageStore, id: &str) -> anyhow::Result<()> {
    let id: MessageId = id.parse()?;
    let record = store.read(&id)?;
    println!("ID:       {id}");
    println!("File:     {}", store.path_for(&id).display());
    print_record(&record)
}

fn print_record(record: &fsqueue::Record) -> anyhow::Result<()> {
    for (name, value) in &record.headers {
        println!("Header:   {name}: {value}");
    }
    match serde_json::from_str::<serde_json::Value>(&record.body) {
        Ok(body) => println!("Body:     {}", serde_json::to_string_pretty(&body)?),
        Err(_) => println!("Body:     {}", record.body),
    }
    Ok(())
}

fn cmd_finalize(store: &MessageStore, id: &str, status: Status) -> anyhow::Result<()> {
    let id: MessageId = id.parse()?;
    // The type header is only needed for the outcome log; an unreadable
    // message can still be finished.
    let message_type = store
        .read(&id)
        .ok()
        .and_then(|record| record.headers.get(TYPE_HEADER).cloned())
        .unwrap_or_else(|| "unknown".to_string());

    match status {
        Status::Processed => store.ack(&id, &message_type)?,
        Status::Failed => store.reject(&id, &message_type)?,
    }
    println!("{id}: {status}");
    Ok(())
}

fn cmd_consume(transport: &JsonTransport, poll: Duration, once: bool) -> anyhow::Result<()> {
    loop {
        let envelope = match transport.get() {
            Ok(envelope) => envelope,
            // Disk trouble may clear up (permissions fixed, file replaced).
            Err(e) if e.is_storage() && !once => {
                tracing::warn!(error = %e, "read failed, retrying");
                std::thread::sleep(poll);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        match envelope {
            Some(envelope) => {
                println!("{}", serde_json::to_string(envelope.message())?);
                transport.ack(&envelope)?;
            }
            None if once => return Ok(()),
            None => std::thread::sleep(poll),
        }
    }
}

fn cmd_history(store: &MessageStore, status: &str, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let status: Status = status.parse()?;
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let entries = store.outcomes().entries(status, date)?;

    if entries.is_empty() {
        println!("No {status} entries for {date}.");
        return Ok(());
    }

    println!("{:<19}  {:<42}  TYPE", "TIMESTAMP", "ID");
    println!("{}", "-".repeat(90));
    for entry in &entries {
        println!(
            "{:<19}  {:<42}  {}",
            entry.timestamp, entry.message_id, entry.message_type
        );
    }
    println!("\n{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    Ok(())
}
