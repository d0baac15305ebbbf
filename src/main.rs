use anyhow::{Context, Result};
use asset_harvest::events::{EventSink, HarvestEvent, RunReport};
use asset_harvest::{load_config, load_settings, HarvestError, Harvester, HttpFetcher};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asset-harvest", version)]
#[command(about = "Download the assets referenced by JSON sources and stage them into a project")]
struct Cli {
    /// Run configuration (JSON)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Directory for timestamped working trees
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Keep the working tree after a successful run
    #[arg(long)]
    keep_temp: bool,

    /// Exit with status 2 when any source, probe or download failed
    #[arg(long)]
    strict: bool,

    /// Print events as JSON lines instead of the console view
    #[arg(long)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

struct ConsoleSink;

impl ConsoleSink {
    fn banner(msg: &str) {
        let line = "\u{2500}".repeat(msg.chars().count() + 2);
        println!("\u{250C}{}\u{2510}", line);
        println!("\u{2502} {} \u{2502}", msg);
        println!("\u{2514}{}\u{2518}", line);
        println!();
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: HarvestEvent) {
        match event {
            HarvestEvent::Started { schemas, working_tree } => {
                Self::banner(&format!("Asset Harvest v{}", env!("CARGO_PKG_VERSION")));
                println!("Downloading assets for {} JSON schema(s):", schemas.len());
                for schema in schemas {
                    println!("\n  Schema {}:", schema.index + 1);
                    for url in schema.sources {
                        println!("    {}", url);
                    }
                }
                println!("\n  working tree: {}\n", working_tree.display());
            }
            HarvestEvent::SourceStaged { schema_index, url, references, queued } => {
                println!(
                    "  [{}] {} ({} fields, {} queued)",
                    schema_index + 1,
                    url,
                    references,
                    queued
                );
            }
            HarvestEvent::SourceFailed { url, error, .. } => {
                eprintln!("  ERROR: {}: {}", url, error)
            }
            HarvestEvent::ProbeFailed { url, error } => {
                eprintln!("  skipped asset {}: {}", url, error)
            }
            HarvestEvent::DownloadStarted { position, count, url, .. } => {
                println!("\n  ({}/{}) {}", position, count, url);
            }
            HarvestEvent::DownloadProgress { downloaded, progress, speed, .. } => {
                print!(
                    "\r    {:>5.1}%  {}  {}/s   ",
                    progress * 100.0,
                    format_size(downloaded),
                    format_size(speed as u64)
                );
                let _ = std::io::stdout().flush();
            }
            HarvestEvent::DownloadCompleted { size, copies, .. } => {
                println!("\n    done, {} (+{} copies)", format_size(size), copies);
            }
            HarvestEvent::DownloadFailed { url, error, .. } => {
                eprintln!("\n    FAILED {}: {}", url, error)
            }
            HarvestEvent::Relocated { to, .. } => println!("  moved {}", to.display()),
            HarvestEvent::Finished { report } => print_summary(&report),
        }
    }
}

struct JsonSink;

impl EventSink for JsonSink {
    fn emit(&self, event: HarvestEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            println!("{}", line);
        }
    }
}

fn print_summary(report: &RunReport) {
    println!();
    ConsoleSink::banner("Done");
    println!(
        "  {} source(s) staged, {} asset(s) downloaded, {} copies, {} source(s) relocated",
        report.sources_staged, report.downloaded, report.copies, report.relocated
    );
    if !report.is_clean() {
        println!("\n  {} error(s):", report.errors.len());
        for entry in &report.errors {
            println!("    {:?} {}: {}", entry.stage, entry.target, entry.message);
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut b = bytes as f64;
    let mut i = 0usize;
    while b >= 1024.0 && i < units.len() - 1 {
        b /= 1024.0;
        i += 1;
    }
    format!("{:.2} {}", b, units[i])
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            match e.downcast_ref::<HarvestError>() {
                Some(HarvestError::Cancelled { .. }) => 130,
                _ => 1,
            }
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let mut settings = load_settings();
    if let Some(dir) = cli.temp_dir {
        settings.temp_root = Some(dir);
    }

    let fetcher = HttpFetcher::new(&settings).context("building HTTP client")?;
    let harvester = Harvester::new(config, settings, fetcher).keep_working_tree(cli.keep_temp);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let sink: Box<dyn EventSink> = if cli.json {
        Box::new(JsonSink)
    } else {
        Box::new(ConsoleSink)
    };
    let report = harvester.run(sink.as_ref(), &cancel).await?;

    if cli.strict && !report.is_clean() {
        return Ok(2);
    }
    Ok(0)
}
