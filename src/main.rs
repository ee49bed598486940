use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use nmap_batch_rs::config::Settings;
use nmap_batch_rs::logger::{Collision, LogFormat, ResultLogger};
use nmap_batch_rs::options::{build_arguments, ScanOptions};
use nmap_batch_rs::sink::{LogSink, Sink};
use nmap_batch_rs::{ports, table, targets};
use nmap_batch_rs::{NmapEngine, ScanClient, ScanDispatcher};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use time::UtcOffset;
use tokio_util::sync::CancellationToken;

/// nmap-batch-rs: run nmap against several targets at once and keep timestamped logs.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nmap-batch-rs",
    version,
    about = "Run nmap against several targets concurrently and keep timestamped result logs.",
    long_about = None
)]
struct Cli {
    /// Comma-separated targets (IPs or hostnames). Prompted for when omitted.
    #[arg(long, short = 't')]
    targets: Option<String>,

    /// File with targets, separated by commas or newlines; `#` starts a comment.
    #[arg(long = "targets-file")]
    targets_file: Option<PathBuf>,

    /// nmap port specification.
    #[arg(long, short = 'p')]
    ports: Option<String>,

    /// TOML settings file (defaults to ~/.nmap-batch.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from a named stealth preset; individual flags override it.
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Decoy specification passed to `-D`, e.g. RND:10.
    #[arg(long)]
    decoy: Option<String>,

    /// Fragment packets (`-f`).
    #[arg(long, default_value_t = false)]
    fragment: bool,

    /// Idle-scan zombie host (`-sI`).
    #[arg(long)]
    zombie: Option<String>,

    /// Timing template 0-5 (`-T<n>`).
    #[arg(long)]
    timing: Option<u8>,

    /// Spoofed source port (`--source-port`).
    #[arg(long = "source-port")]
    source_port: Option<u16>,

    /// IP time-to-live (`--ttl`).
    #[arg(long)]
    ttl: Option<u8>,

    /// Scan mode used when no stealth flag is set.
    #[arg(long = "scan-mode", allow_hyphen_values = true)]
    scan_mode: Option<String>,

    /// Base directory for result logs.
    #[arg(long = "log-dir")]
    log_dir: Option<PathBuf>,

    /// Log formats (json, txt, md); repeat or comma-separate.
    #[arg(long = "format", value_delimiter = ',')]
    formats: Vec<LogFormat>,

    /// Also write a record for targets that returned no results.
    #[arg(long = "log-failures", default_value_t = false)]
    log_failures: bool,

    /// Refuse to overwrite a log written within the same second.
    #[arg(long = "no-overwrite", default_value_t = false)]
    no_overwrite: bool,

    /// Max simultaneous nmap processes (default: one per target).
    #[arg(long = "max-concurrency")]
    max_concurrency: Option<usize>,

    /// Per-target nmap timeout in seconds.
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Path to the nmap binary.
    #[arg(long = "nmap-path")]
    nmap_path: Option<String>,

    /// Debug-level diagnostics.
    #[arg(long, short = 'v', default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Paranoid,
    Sneaky,
}

impl Cli {
    fn apply(&self, mut s: Settings) -> Settings {
        if let Some(p) = &self.ports {
            s.port_range = p.clone();
        }
        if let Some(d) = &self.log_dir {
            s.log_dir = d.clone();
        }
        if !self.formats.is_empty() {
            s.formats = self.formats.clone();
        }
        s.log_failures |= self.log_failures;
        if self.no_overwrite {
            s.collision = Collision::Fail;
        }
        if self.max_concurrency.is_some() {
            s.max_concurrency = self.max_concurrency;
        }
        if let Some(t) = self.timeout_secs {
            s.timeout_secs = t;
        }
        if let Some(p) = &self.nmap_path {
            s.nmap_path = p.clone();
        }

        let mut opts = match self.preset {
            Some(Preset::Paranoid) => ScanOptions::paranoid(),
            Some(Preset::Sneaky) => ScanOptions::sneaky(),
            None => s.stealth.clone(),
        };
        if self.decoy.is_some() {
            opts.decoy = self.decoy.clone();
        }
        opts.fragmentation |= self.fragment;
        if self.zombie.is_some() {
            opts.idle_zombie = self.zombie.clone();
        }
        if self.timing.is_some() {
            opts.timing = self.timing;
        }
        if self.source_port.is_some() {
            opts.source_port = self.source_port;
        }
        if self.ttl.is_some() {
            opts.ttl = self.ttl;
        }
        if let Some(m) = &self.scan_mode {
            opts.scan_mode = m.clone();
        }
        s.stealth = opts;
        s
    }

    fn collect_targets(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        if let Some(t) = &self.targets {
            out.extend(targets::parse_targets_str(t));
        }
        if let Some(path) = &self.targets_file {
            out.extend(targets::load_targets_from_path(path)?);
        }
        if out.is_empty() && self.targets.is_none() && self.targets_file.is_none() {
            out = prompt_targets()?;
        }
        Ok(out)
    }
}

fn prompt_targets() -> Result<Vec<String>> {
    print!("Enter target IP: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read target from stdin")?;
    Ok(targets::parse_targets_str(&line))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    // Must be queried before the runtime starts its worker threads.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let settings = cli.apply(Settings::load(cli.config.as_deref(), &LogSink)?);
    let port_range = ports::normalize_port_range(&settings.port_range)?;
    let targets = cli.collect_targets()?;
    if targets.is_empty() {
        bail!("no targets given");
    }
    let arguments = build_arguments(&settings.stealth);

    println!("nmap-batch-rs configuration:");
    println!("  targets      : {}", targets.join(", "));
    println!("  ports        : {}", port_range);
    println!("  arguments    : {}", arguments);
    println!(
        "  concurrency  : {}",
        settings
            .max_concurrency
            .map(|n| n.to_string())
            .unwrap_or_else(|| "one per target".to_string())
    );
    println!("  log_dir      : {}", settings.log_dir.display());

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(run(settings, targets, port_range, arguments, offset))
}

async fn run(
    settings: Settings,
    targets: Vec<String>,
    port_range: String,
    arguments: String,
    offset: UtcOffset,
) -> Result<()> {
    let sink: Arc<dyn Sink> = Arc::new(LogSink);
    let engine = NmapEngine::new()
        .with_path(settings.nmap_path.clone())
        .with_timeout(settings.timeout())
        .with_sink(sink.clone());
    let client = ScanClient::new(Arc::new(engine))
        .with_arguments(arguments)
        .with_sink(sink.clone());
    let dispatcher = ScanDispatcher::new(client).with_max_concurrency(settings.max_concurrency);

    // Ctrl-C abandons in-flight scans.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    println!("\nScanning {} target(s)...", targets.len());
    let batch = dispatcher
        .dispatch_all_with_cancel(&targets, &port_range, cancel)
        .await?;
    println!("Scan complete\n");
    print!("{}", table::render_batch(&batch));

    let logger = ResultLogger::new(&settings.log_dir)?
        .with_offset(offset)
        .with_collision(settings.collision)
        .with_sink(sink);
    let written = logger.log_batch(&batch, &settings.formats, settings.log_failures)?;
    for path in &written {
        println!("Saved {}", path.display());
    }
    if written.is_empty() {
        println!("No results to save.");
    }
    Ok(())
}
