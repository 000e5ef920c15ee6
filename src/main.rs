//! Compile Lane CLI
//!
//! Entry point for the `compile-lane` command-line tool. Drives the compile
//! core the same way a request handler would: one normalized job in, an
//! artifact path or diagnostics out.

use clap::{Parser, Subcommand};
use compile_lane::config::DEFAULT_CONFIG_FILE;
use compile_lane::{
    evict_now, CancelToken, CompileService, EffectiveConfig, JobOutcome, JobRequest,
};
use serde_json::{json, Value};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "compile-lane")]
#[command(about = "Cached, single-lane compilation service", version)]
struct Cli {
    /// Path to config file (default: ./compile-lane.toml if present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Artifact cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Cache budget in bytes
    #[arg(long, global = true)]
    cache_budget: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file through the build queue
    Build {
        /// Board name, or "wasm" for the simulator
        #[arg(long, short = 't', default_value = "wasm")]
        target: String,

        /// Output format: wasm, elf, hex or uf2
        #[arg(long, short = 'f', default_value = "wasm")]
        format: String,

        /// Give up and cancel the build after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Source file ("-" for stdin)
        source: PathBuf,
    },

    /// Run a cache eviction pass now
    Evict {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let effective = match load_config(&cli) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    let code = match cli.command {
        Commands::Build {
            target,
            format,
            timeout,
            json,
            source,
        } => run_build(&effective, &target, &format, timeout, json, &source),
        Commands::Evict { json } => run_evict(&effective, json),
        Commands::Config => run_config(&effective),
    };

    process::exit(code);
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("compile_lane={level},lane_worker={level}"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_config(cli: &Cli) -> Result<EffectiveConfig, compile_lane::config::ConfigError> {
    let path = EffectiveConfig::resolve_path(cli.config.clone(), DEFAULT_CONFIG_FILE);

    let mut overrides = serde_json::Map::new();
    if let Some(dir) = &cli.cache_dir {
        overrides.insert("cache_dir".to_string(), json!(dir.to_string_lossy()));
    }
    if let Some(budget) = cli.cache_budget {
        overrides.insert("cache_budget_bytes".to_string(), json!(budget));
    }
    let overrides = (!overrides.is_empty()).then_some(Value::Object(overrides));

    EffectiveConfig::build(path.as_deref(), overrides)
}

fn read_source(source: &Path) -> io::Result<Vec<u8>> {
    if source.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(source)
    }
}

fn run_build(
    effective: &EffectiveConfig,
    target: &str,
    format: &str,
    timeout: Option<u64>,
    json: bool,
    source: &Path,
) -> i32 {
    let bytes = match read_source(source) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", source.display(), e);
            return 2;
        }
    };

    let request = match JobRequest::parse(bytes, target, format) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    let digest = request.digest.clone();

    let service = match CompileService::start(&effective.config) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };

    let handle = service.submit(request);
    if let Err(e) = install_interrupt_handler(handle.cancel_token()) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }
    let outcome = match timeout {
        Some(secs) => match handle.wait_timeout(Duration::from_secs(secs)) {
            Some(outcome) => outcome,
            None => {
                tracing::warn!(timeout_secs = secs, "build timed out, cancelling");
                handle.cancel();
                handle.wait()
            }
        },
        None => handle.wait(),
    };

    if let Err(e) = service.shutdown() {
        tracing::error!(error = %e, "build worker did not shut down cleanly");
    }

    match outcome {
        JobOutcome::Built(path) => {
            if json {
                let payload = json!({
                    "status": "built",
                    "digest": digest.as_str(),
                    "artifact": path.to_string_lossy(),
                });
                println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
            } else {
                println!("{}", path.display());
            }
            0
        }
        JobOutcome::Failed(diagnostics) => {
            if json {
                let payload = json!({
                    "status": "failed",
                    "digest": digest.as_str(),
                    "diagnostics": String::from_utf8_lossy(&diagnostics),
                });
                println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
            } else {
                let _ = io::stderr().write_all(&diagnostics);
            }
            1
        }
    }
}

/// First interrupt cancels the build, a second one exits immediately.
fn install_interrupt_handler(cancel: CancelToken) -> Result<(), ctrlc::Error> {
    let interrupted = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            eprintln!("\nReceived second interrupt, exiting immediately...");
            process::exit(130);
        }
        eprintln!("\nReceived interrupt signal, cancelling build...");
        cancel.cancel();
    })
}

fn run_evict(effective: &EffectiveConfig, json: bool) -> i32 {
    match evict_now(&effective.config) {
        Ok(report) => {
            if json {
                let payload = json!({
                    "scanned": report.scanned,
                    "total_before": report.total_before,
                    "total_after": report.total_after,
                    "deleted": report.deleted,
                    "bytes_reclaimed": report.bytes_reclaimed,
                    "errors": report.errors,
                });
                println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
            } else {
                println!(
                    "Scanned {} entries, deleted {} ({} bytes), {} bytes remain",
                    report.scanned,
                    report.deleted.len(),
                    report.bytes_reclaimed,
                    report.total_after
                );
                for error in &report.errors {
                    eprintln!("  {}", error);
                }
            }
            if report.errors.is_empty() {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Error: eviction failed: {}", e);
            1
        }
    }
}

fn run_config(effective: &EffectiveConfig) -> i32 {
    match serde_json::to_string_pretty(effective) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
