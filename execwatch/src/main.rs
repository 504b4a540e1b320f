//! # execwatch - Main Entry Point
//!
//! Runs pre-flight checks, starts the capture pipeline, and reads exec events
//! on a blocking thread until SIGINT, SIGTERM or SIGHUP. Resources are always
//! released in reverse acquisition order before exit.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::signal::unix::{signal, SignalKind};

use execwatch::capture::{AyaBackend, CancelSignal, Pipeline};
use execwatch::cli::Args;
use execwatch::preflight::{remove_memlock_limit, run_preflight_checks};
use execwatch::report::{display_statistics, JsonReporter, LogReporter};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied")
        || msg.contains("operation not permitted")
        || msg.contains("requires root")
    {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    if !args.skip_preflight {
        run_preflight_checks(&args.object, args.buffer)?;
    }
    remove_memlock_limit();

    let config = args.capture_config();
    if !quiet {
        eprintln!("execwatch v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("object: {}", config.artifact);
        eprintln!("tracepoint: {}", config.probe.tracepoint);
        eprintln!("buffer: {:?}", config.variant);
    }

    let mut pipeline = Pipeline::new(AyaBackend::new(config));
    pipeline.start().context("Failed to start exec capture")?;

    // Install handlers before the read loop starts so no signal is missed
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    let cancel = CancelSignal::new();
    let loop_cancel = cancel.clone();
    let json = args.json;
    let mut read_task = tokio::task::spawn_blocking(move || {
        let result = if json {
            let mut reporter = JsonReporter::new(std::io::stdout().lock());
            pipeline.run(&loop_cancel, &mut reporter)
        } else {
            pipeline.run(&loop_cancel, &mut LogReporter)
        };
        (pipeline, result)
    });

    let finished = tokio::select! {
        joined = &mut read_task => Some(joined),
        _ = &mut ctrl_c => None,
        _ = sigterm.recv() => None,
        _ = sighup.recv() => None,
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            info!("Stopping exec capture...");
            cancel.cancel();
            read_task.await
        }
    };
    let (mut pipeline, result) = joined.context("Read loop panicked")?;

    let closed = pipeline.close();
    if !quiet {
        display_statistics(&pipeline.stats());
    }

    result.context("Failed reading exec events")?;
    closed.context("Failed to release capture resources")?;
    Ok(())
}
