//! geoshard-ctl — operator CLI for the shard topology control plane.
//!
//! Usage:
//!   geoshard-ctl init-config --out topology.json
//!   geoshard-ctl validate --config topology.json [--strict-coverage]
//!   geoshard-ctl plan --config topology.json --state cluster.json
//!   geoshard-ctl apply --config topology.json --state cluster.json [--dry-run]
//!
//! `validate` never touches cluster state. `plan` diffs against the
//! state file read-only. `apply` converges the state file; re-running
//! it against a converged state issues zero mutating calls.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use geoshard::cluster::FileCluster;
use geoshard::config::TopologySpec;
use geoshard::reconcile::Reconciler;
use geoshard::validate::{validate, CoveragePolicy};

#[derive(Parser)]
#[command(name = "geoshard-ctl", about = "Geo-zoned shard topology control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the built-in five-region reference topology as JSON.
    InitConfig {
        #[arg(long)]
        out: PathBuf,
    },
    /// Check the topology without touching any cluster state.
    Validate {
        #[arg(long)]
        config: PathBuf,
        /// Treat unmapped key-space gaps as fatal.
        #[arg(long)]
        strict_coverage: bool,
    },
    /// Show the operations a run of `apply` would issue.
    Plan {
        #[arg(long)]
        config: PathBuf,
        /// Cluster state file (absent file = empty cluster).
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        strict_coverage: bool,
    },
    /// Converge the cluster state file to the topology.
    Apply {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        strict_coverage: bool,
        /// Plan only; do not execute.
        #[arg(long)]
        dry_run: bool,
    },
}

fn coverage_policy(spec: &TopologySpec, strict_flag: bool) -> CoveragePolicy {
    if strict_flag {
        CoveragePolicy::Strict
    } else {
        spec.coverage
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::InitConfig { out } => {
            TopologySpec::reference().write_to(&out)?;
            tracing::info!(path = %out.display(), "wrote reference topology");
        }
        Command::Validate {
            config,
            strict_coverage,
        } => {
            let spec = TopologySpec::read_from(&config)?;
            let topology = spec.build()?;
            let report = validate(&topology, coverage_policy(&spec, strict_coverage))?;
            println!(
                "topology ok: {} shards, {} zones, {} collections, {} ranges ({} coverage gaps)",
                topology.shards().len(),
                topology.zones().len(),
                topology.collections().len(),
                topology.ranges().len(),
                report.gaps.len(),
            );
        }
        Command::Plan {
            config,
            state,
            strict_coverage,
        } => {
            let spec = TopologySpec::read_from(&config)?;
            let topology = spec.build()?;
            validate(&topology, coverage_policy(&spec, strict_coverage))?;
            let cluster = FileCluster::open(&state)?;
            let plan = Reconciler::new().plan(&topology, cluster.state())?;
            print!("{}", plan);
        }
        Command::Apply {
            config,
            state,
            strict_coverage,
            dry_run,
        } => {
            let spec = TopologySpec::read_from(&config)?;
            let topology = spec.build()?;
            validate(&topology, coverage_policy(&spec, strict_coverage))?;
            let mut cluster = FileCluster::open(&state)?;
            let reconciler = Reconciler::new();
            let plan = if dry_run {
                reconciler.plan(&topology, cluster.state())?
            } else {
                reconciler.apply(&topology, &mut cluster)?
            };
            print!("{}", plan);
            if !dry_run {
                tracing::info!(
                    ops = plan.len(),
                    state = %state.display(),
                    "converged; balancer migrates data in the background"
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
