use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;
use crate::env_loader::DotenvLoadOutcome;

#[derive(Debug, Parser)]
#[command(name = "ctxd")]
#[command(about = "Session context tracker: fact extraction, continuity ledger and handoffs")]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch the assistant log directory and record facts.
    Watch(WatchArgs),
    /// Show the latest ledger entry.
    Ledger(RepoArgs),
    /// Write a handoff from the latest ledger entry now.
    Handoff(HandoffArgs),
    /// Print the compressed, non-stale fact set across the whole ledger.
    Context(ContextArgs),
    /// Diff the last two ledger entries.
    Diff(RepoArgs),
}

#[derive(Debug, Args, Default)]
pub struct WatchArgs {
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub logs: Option<PathBuf>,
    #[arg(long)]
    pub repo: Option<PathBuf>,
    #[arg(long)]
    pub store_url: Option<String>,
    #[arg(long)]
    pub threshold: Option<u64>,
    #[arg(long)]
    pub no_smart: bool,
    #[arg(long)]
    pub once: bool,
    #[arg(long)]
    pub skip_verify: bool,
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Args, Default)]
pub struct RepoArgs {
    #[arg(long)]
    pub repo: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct HandoffArgs {
    #[arg(long)]
    pub session: String,
    #[arg(long)]
    pub repo: Option<PathBuf>,
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(Debug, Args, Default)]
pub struct ContextArgs {
    #[arg(long)]
    pub repo: Option<PathBuf>,
    #[arg(long)]
    pub max_per_type: Option<usize>,
}

fn print_report(report: &commands::CommandReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if let Some(output) = &report.output {
        println!("{}", output.trim_end());
        println!();
    }
    println!("command: {}", report.command);
    println!("ok: {}", report.ok);
    if !report.details.is_empty() {
        println!("details:");
        for detail in &report.details {
            println!("- {detail}");
        }
    }
    if !report.issues.is_empty() {
        println!("issues:");
        for issue in &report.issues {
            println!("- {issue}");
        }
    }
    Ok(())
}

pub fn run(dotenv: DotenvLoadOutcome) -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Command::Watch(args) if args.verbose);
    crate::logging::init(verbose);
    log::debug!("dotenv: {dotenv:?}");

    let report = match &cli.command {
        Command::Watch(args) => commands::watch::run(&commands::watch::WatchOptions {
            project: args.project.clone(),
            logs: args.logs.clone(),
            repo: args.repo.clone(),
            store_url: args.store_url.clone(),
            threshold: args.threshold,
            no_smart: args.no_smart,
            once: args.once,
            skip_verify: args.skip_verify,
            verbose: args.verbose,
        })?,
        Command::Ledger(args) => commands::ledger::run(&commands::ledger::LedgerOptions {
            repo: args.repo.clone(),
        })?,
        Command::Handoff(args) => commands::handoff::run(&commands::handoff::HandoffOptions {
            session: args.session.clone(),
            repo: args.repo.clone(),
            project: args.project.clone(),
        })?,
        Command::Context(args) => commands::context::run(&commands::context::ContextOptions {
            repo: args.repo.clone(),
            max_per_type: args.max_per_type,
        })?,
        Command::Diff(args) => commands::diff::run(&commands::diff::DiffOptions {
            repo: args.repo.clone(),
        })?,
    };

    print_report(&report, cli.json)?;

    if report.ok {
        Ok(())
    } else {
        std::process::exit(2);
    }
}
