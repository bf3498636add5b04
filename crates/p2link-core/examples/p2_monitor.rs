//! P2 Furnace Monitor
//!
//! Logs in to a P2 pellet furnace, runs the initialisation handshake and
//! records telemetry until interrupted.
//!
//! Usage:
//!   cargo run --example p2_monitor -- [OPTIONS] [PORT]
//!
//! Options:
//!   --config FILE       JSON settings (see MonitorConfig)
//!   --port PORT         Serial port (default: /dev/ttyS0)
//!   --baud RATE         Baud rate (default: 9600)
//!   --user USER         plumber | normal | normal2 | service (default: service)
//!   --stages LIST       Comma-separated auth,init,data,all (default: all)
//!   --retry N           Reruns of a failed init/data stage (default: 3)
//!   --poll MS           Pause between data requests in ms (default: 1000)
//!   --furnace-clock     Timestamp records with the furnace clock
//!   --strict            Treat checksum mismatches as read errors
//!   --max-records N     Stop after N records
//!   --duration SECS     Stop after SECS seconds
//!   --store FILE        Keep records in a JSON store
//!   --log FILE          Append records to a text log
//!   --csv FILE          Write records as CSV rows
//!   --dump OUT          Dump --store as decoded CSV to OUT (- for stdout) and exit
//!   --list              List serial ports and exit

use anyhow::{bail, Context, Result};
use p2link_core::config::MonitorConfig;
use p2link_core::monitor::run_stages;
use p2link_core::protocol::{list_ports, Session};
use p2link_core::store::{CsvLog, MemoryStore, Sink, TextLog};
use p2link_core::telemetry::csv_dump;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Options {
    config: Option<PathBuf>,
    port: Option<String>,
    baud: Option<u32>,
    user: Option<String>,
    stages: Option<String>,
    retry: Option<u32>,
    poll_ms: Option<u64>,
    furnace_clock: bool,
    strict: bool,
    max_records: Option<u64>,
    duration_secs: Option<u64>,
    store: Option<PathBuf>,
    log: Option<PathBuf>,
    csv: Option<PathBuf>,
    dump: Option<String>,
    list: bool,
}

fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .with_context(|| format!("{} needs a value", flag))
}

fn number<T: std::str::FromStr>(args: &[String], i: &mut usize, flag: &str) -> Result<T> {
    let raw = value(args, i, flag)?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("{}: '{}' is not a number", flag, raw))
}

fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut opts = Options::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => opts.config = Some(value(args, &mut i, "--config")?.into()),
            "--port" | "-p" => opts.port = Some(value(args, &mut i, "--port")?.to_string()),
            "--baud" | "-b" => opts.baud = Some(number(args, &mut i, "--baud")?),
            "--user" | "-u" => opts.user = Some(value(args, &mut i, "--user")?.to_string()),
            "--stages" | "-s" => opts.stages = Some(value(args, &mut i, "--stages")?.to_string()),
            "--retry" | "-r" => opts.retry = Some(number(args, &mut i, "--retry")?),
            "--poll" | "-w" => opts.poll_ms = Some(number(args, &mut i, "--poll")?),
            "--furnace-clock" => opts.furnace_clock = true,
            "--strict" => opts.strict = true,
            "--max-records" => opts.max_records = Some(number(args, &mut i, "--max-records")?),
            "--duration" => opts.duration_secs = Some(number(args, &mut i, "--duration")?),
            "--store" => opts.store = Some(value(args, &mut i, "--store")?.into()),
            "--log" => opts.log = Some(value(args, &mut i, "--log")?.into()),
            "--csv" => opts.csv = Some(value(args, &mut i, "--csv")?.into()),
            "--dump" => opts.dump = Some(value(args, &mut i, "--dump")?.to_string()),
            "--list" | "-l" => opts.list = true,
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            arg if !arg.starts_with('-') => opts.port = Some(arg.to_string()),
            other => bail!("unknown option: {}", other),
        }
        i += 1;
    }
    Ok(Some(opts))
}

fn print_help() {
    println!("P2 Furnace Monitor");
    println!();
    println!("Usage: p2_monitor [OPTIONS] [PORT]");
    println!();
    println!("  --config FILE     JSON settings");
    println!("  --port PORT       Serial port (default: /dev/ttyS0)");
    println!("  --baud RATE       Baud rate (default: 9600)");
    println!("  --user USER       plumber | normal | normal2 | service");
    println!("  --stages LIST     auth,init,data,all (default: all)");
    println!("  --retry N         Reruns of a failed init/data stage");
    println!("  --poll MS         Pause between data requests");
    println!("  --furnace-clock   Timestamp records with the furnace clock");
    println!("  --strict          Treat checksum mismatches as read errors");
    println!("  --max-records N   Stop after N records");
    println!("  --duration SECS   Stop after SECS seconds");
    println!("  --store FILE      Keep records in a JSON store");
    println!("  --log FILE        Append records to a text log");
    println!("  --csv FILE        Write records as CSV rows");
    println!("  --dump OUT        Dump --store as CSV to OUT (- for stdout)");
    println!("  --list            List serial ports");
}

fn apply(opts: &Options, config: &mut MonitorConfig) -> Result<()> {
    if let Some(port) = &opts.port {
        config.port = port.clone();
    }
    if let Some(baud) = opts.baud {
        config.baud_rate = baud;
    }
    if let Some(user) = &opts.user {
        config.auth.user = user.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(stages) = &opts.stages {
        config.stages = stages.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(retry) = opts.retry {
        config.max_stage_retry = retry;
    }
    if let Some(poll) = opts.poll_ms {
        config.exchange.poll_interval_ms = poll;
    }
    if opts.furnace_clock {
        config.exchange.use_furnace_clock = true;
    }
    if opts.strict {
        config.transport.strict_checksum = true;
    }
    if opts.max_records.is_some() {
        config.exchange.max_records = opts.max_records;
    }
    if opts.duration_secs.is_some() {
        config.exchange.max_duration_secs = opts.duration_secs;
    }
    Ok(())
}

fn dump(store_path: Option<&PathBuf>, out: &str) -> Result<()> {
    let path = store_path.context("--dump needs --store")?;
    let store = MemoryStore::load(path).with_context(|| format!("loading {}", path.display()))?;
    let rows = if out == "-" {
        csv_dump(&store, std::io::stdout().lock(), true, "; ")?
    } else {
        let file = std::fs::File::create(out).with_context(|| format!("creating {}", out))?;
        csv_dump(&store, std::io::BufWriter::new(file), true, "; ")?
    };
    eprintln!("{} rows written", rows);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(opts) = parse_args(&args)? else {
        return Ok(());
    };

    if opts.list {
        for port in list_ports() {
            match &port.product {
                Some(product) => println!("{}  ({})", port.name, product),
                None => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    if let Some(out) = &opts.dump {
        return dump(opts.store.as_ref(), out);
    }

    let mut config = match &opts.config {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };
    apply(&opts, &mut config)?;
    let plan = config.plan()?;

    // First SIGINT / SIGTERM stops the session between two exchanges, a
    // second one exits right away
    let cancel = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&cancel))?;
        signal_hook::flag::register(signal, Arc::clone(&cancel))?;
    }
    let run_options = config.run_options();

    let mut store = match &opts.store {
        Some(path) if path.exists() => MemoryStore::load(path)?,
        _ => MemoryStore::new(),
    };
    let mut text_log = opts.log.as_ref().map(TextLog::append).transpose()?;
    let mut csv_log = opts.csv.as_ref().map(CsvLog::create).transpose()?;

    let mut session = Session::open(
        Box::new(config.connector()),
        config.transport.clone(),
        config.init.clone(),
        tracing::info_span!("furnace", port = %config.port),
    )?;
    session.set_interrupt(cancel);

    let result = {
        let mut sinks = Vec::new();
        if opts.store.is_some() {
            sinks.push(Sink::KeyValue(&mut store));
        }
        if let Some(log) = text_log.as_mut() {
            sinks.push(Sink::FlatFile(log));
        }
        if let Some(log) = csv_log.as_mut() {
            sinks.push(Sink::Tabular(log));
        }
        run_stages(&mut session, &plan, &run_options, &mut sinks)
    };
    session.stop();

    if let Some(path) = &opts.store {
        store
            .save(path)
            .with_context(|| format!("saving {}", path.display()))?;
    }

    let report = result?;
    if let Some(init) = &report.init {
        println!(
            "init: {} handshake exchanges, {} burst replies, final handshake {}",
            init.exchanges,
            init.burst_replies,
            if init.final_acknowledged { "acknowledged" } else { "unanswered" }
        );
    }
    if let Some(exchange) = &report.exchange {
        println!(
            "data: {} cycles, {} records ({} invalid)",
            exchange.cycles, exchange.records, exchange.invalid_records
        );
    }
    Ok(())
}
