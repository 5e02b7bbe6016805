use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for perfscene")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, doc, headless smoke run
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Run cargo deny check
    Deny,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
    /// Time batch building, rescattering and strategy population
    Bench,
    /// Run a few headless frames through the CLI
    Smoke,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            fmt()?;
            clippy()?;
            test()?;
            doc()?;
            smoke()?;
        }
        Commands::Fmt => fmt()?,
        Commands::Clippy => clippy()?,
        Commands::Test => test()?,
        Commands::Deny => cargo("cargo deny", &["deny", "check", "licenses", "bans", "sources"])?,
        Commands::Doc => doc()?,
        Commands::Build => cargo("cargo build", &["build", "--workspace"])?,
        Commands::Bench => {
            cargo(
                "batch benchmark",
                &["bench", "-p", "perfscene-instancing", "--bench", "bench_batch"],
            )?;
            cargo(
                "population benchmark",
                &["bench", "-p", "perfscene-scene", "--bench", "bench_populate"],
            )?;
        }
        Commands::Smoke => smoke()?,
    }

    Ok(())
}

fn fmt() -> Result<()> {
    cargo("cargo fmt --check", &["fmt", "--all", "--", "--check"])
}

fn clippy() -> Result<()> {
    cargo(
        "cargo clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn test() -> Result<()> {
    cargo("cargo test", &["test", "--workspace"])
}

fn doc() -> Result<()> {
    cargo("cargo doc", &["doc", "--workspace", "--no-deps"])
}

fn smoke() -> Result<()> {
    cargo(
        "headless simulate",
        &["run", "-p", "perfscene-cli", "--", "simulate", "--frames", "3"],
    )?;
    cargo(
        "strategy compare",
        &["run", "-p", "perfscene-cli", "--", "compare", "--count", "50"],
    )
}

fn cargo(step: &str, args: &[&str]) -> Result<()> {
    println!("==> Running {step}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{step} failed");
    }
    Ok(())
}
