use anyhow::{Context, Result};
use clap::Parser;
use std::process::Command;

const DEFAULT_TARGET: &str = "bpfel-unknown-none";

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Build the kernel-side tracepoint programs
    BuildEbpf {
        #[arg(long, default_value = DEFAULT_TARGET)]
        target: String,
    },
    /// Build everything and run execwatch as root
    Run {
        #[arg(long, default_value = DEFAULT_TARGET)]
        target: String,
        /// Arguments passed through to execwatch
        #[arg(last = true)]
        run_args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target } => build_ebpf(&target)?,
        Cmd::Run { target, run_args } => {
            build_ebpf(&target)?;
            run(&target, &run_args)?;
        }
    }

    Ok(())
}

fn build_ebpf(target: &str) -> Result<()> {
    // Release only: debug builds pull in formatting code the BPF linker rejects
    let status = Command::new("cargo")
        .args(["+nightly", "build", "--package", "execwatch-ebpf", "--target", target])
        .args(["-Z", "build-std=core", "--release"])
        .status()
        .context("Failed to build eBPF programs")?;

    if !status.success() {
        anyhow::bail!("Failed to build eBPF programs");
    }

    println!("✓ eBPF programs built successfully");
    println!("  Object: {}", object_path(target));

    Ok(())
}

fn run(target: &str, run_args: &[String]) -> Result<()> {
    let status = Command::new("cargo")
        .args(["build", "--package", "execwatch"])
        .status()
        .context("Failed to build execwatch")?;
    if !status.success() {
        anyhow::bail!("Failed to build execwatch");
    }

    let status = Command::new("sudo")
        .arg("-E")
        .arg("target/debug/execwatch")
        .arg("--object")
        .arg(object_path(target))
        .args(run_args)
        .status()
        .context("Failed to run execwatch")?;

    if !status.success() {
        anyhow::bail!("execwatch exited with {status}");
    }
    Ok(())
}

fn object_path(target: &str) -> String {
    format!("target/{target}/release/execwatch")
}
