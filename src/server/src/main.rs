//! The service binary: HTTP facade by default, worker peer when spawned
//! with the hidden `peer` subcommand by a hosting server process.

use std::io;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::thread;

use clap::{Parser, Subcommand};
use fabric::{Fabric, FabricHost};
use log::{LevelFilter, error, info, warn};
use solver::{ClusterSolver, HybridSolver, SequentialSolver, Solver, ThreadedSolver};

mod http;

#[derive(Parser)]
#[command(version, about = "HTTP facade over the parallel cube solver")]
struct Cli {
    /// TCP port to listen on
    #[arg(default_value_t = 8080)]
    port: u16,

    /// Worker threads for the shared-memory and hybrid backends
    /// (default: available parallelism)
    #[arg(long)]
    threads: Option<usize>,

    /// Total fabric ranks, this process included. Two or more bring up the
    /// cluster and hybrid backends by spawning worker-peer processes.
    #[arg(long, default_value_t = 1)]
    peers: usize,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Join a hosting server process as a fabric worker peer.
    #[command(hide = true)]
    Peer {
        addr: SocketAddr,
        rank: usize,
        size: usize,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            return ExitCode::from(1);
        }
        Err(help_or_version) => {
            let _ = help_or_version.print();
            return ExitCode::SUCCESS;
        }
    };

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
        .init();

    let threads = cli
        .threads
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()));

    match cli.command {
        Some(Command::Peer { addr, rank, size }) => match Fabric::join(addr, rank, size) {
            Ok(fabric) => {
                solver::serve(fabric, threads);
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!("could not join fabric at {addr}: {err}");
                ExitCode::from(1)
            }
        },
        None => match serve_http(&cli, threads) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{err}");
                ExitCode::from(1)
            }
        },
    }
}

fn serve_http(cli: &Cli, threads: usize) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut backends = vec![
        Solver::Sequential(SequentialSolver::new()),
        Solver::Threaded(ThreadedSolver::new(threads)),
    ];

    if cli.peers >= 2 {
        match launch_fabric(cli.peers, threads) {
            Ok(fabric) => {
                let fabric = std::sync::Arc::new(std::sync::Mutex::new(fabric));
                backends.push(Solver::Cluster(ClusterSolver::new(fabric.clone())));
                backends.push(Solver::Hybrid(HybridSolver::new(fabric, threads)));
                info!("cluster and hybrid backends up with {} peers", cli.peers);
            }
            Err(err) => {
                warn!("fabric failed to start, distributed backends disabled: {err}");
            }
        }
    }

    info!(
        "backends available: {}",
        backends
            .iter()
            .map(|b| b.kind().id())
            .collect::<Vec<_>>()
            .join(", ")
    );
    http::run(cli.port, http::App::new(backends))
}

/// Host a fabric and re-execute this binary once per worker peer. The
/// children connect back over the loopback and wait in their serve loop;
/// they exit when the fabric connection drops.
fn launch_fabric(peers: usize, threads: usize) -> io::Result<Fabric> {
    let host = FabricHost::bind(peers)?;
    let addr = host.addr()?;
    let exe = std::env::current_exe()?;
    for rank in 1..peers {
        std::process::Command::new(&exe)
            .arg("--threads")
            .arg(threads.to_string())
            .arg("peer")
            .arg(addr.to_string())
            .arg(rank.to_string())
            .arg(peers.to_string())
            .spawn()?;
    }
    host.accept()
}
