//! Iterative-deepening A\* search for the cube, instantiated against four
//! worker fabrics of increasing parallelism:
//!
//! - [`SequentialSolver`]: one thread, no synchronization.
//! - [`ThreadedSolver`]: the twelve first-ply branches fanned out across
//!   OS threads with a shared cancellation flag and bound aggregation.
//! - [`ClusterSolver`]: the first ply split across message-passing peers,
//!   with a collective bound-reduce and solution broadcast per iteration.
//! - [`HybridSolver`]: peers split the first ply, threads split again
//!   within each peer; two-stage bound reduction.
//!
//! All four drive the same kernel in [`kernel`], so on a given input they
//! agree on solution length; which worker wins a tie is unspecified.

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

pub(crate) mod kernel;

mod cluster;
mod hybrid;
mod sequential;
mod threaded;

use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub use cluster::ClusterSolver;
pub use hybrid::HybridSolver;
pub use sequential::SequentialSolver;
pub use threaded::ThreadedSolver;

use cube::{Cube, Move};
use fabric::Fabric;
use log::{info, warn};
use thiserror::Error;

#[macro_export]
macro_rules! start {
    ($msg:expr) => {
        concat!("⏳ ", $msg)
    };
}

#[macro_export]
macro_rules! working {
    ($msg:expr) => {
        concat!("🛠  ", $msg)
    };
}

#[macro_export]
macro_rules! success {
    ($msg:expr) => {
        concat!("✅ ", $msg)
    };
}

/// Hard cap on any single solve, regardless of the caller's budget.
pub const ENGINE_BUDGET: Duration = Duration::from_secs(120);

/// Depth bound used when the caller does not supply one.
pub const DEFAULT_MAX_DEPTH: u32 = 20;

/// Caller-facing knobs for one solve.
#[derive(Clone, Copy, Debug)]
pub struct SolveOptions {
    /// Give up once the iterative-deepening bound exceeds this depth.
    pub max_depth: u32,
    /// Wall-clock budget; clamped to [`ENGINE_BUDGET`].
    pub budget: Duration,
}

impl Default for SolveOptions {
    fn default() -> SolveOptions {
        SolveOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            budget: ENGINE_BUDGET,
        }
    }
}

impl SolveOptions {
    pub(crate) fn deadline_from(&self, start: Instant) -> Instant {
        start + self.budget.min(ENGINE_BUDGET)
    }
}

/// What one backend produced for one input.
#[derive(Clone, Debug)]
pub struct SolveReport {
    /// `Some` with the move sequence on success (empty for an
    /// already-solved input), `None` when the depth bound or the clock was
    /// exhausted. An exhausted search is a result, not an error.
    pub solution: Option<Vec<Move>>,
    /// Kernel nodes visited, summed over this process's workers.
    pub nodes: u64,
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl SolveReport {
    #[must_use]
    pub fn solved(&self) -> bool {
        self.solution.is_some()
    }
}

/// Failures of the solve machinery itself, as opposed to unsuccessful
/// searches.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("peer fabric failed: {0}")]
    Fabric(#[from] io::Error),
    #[error("received unknown move byte {0} in a solution broadcast")]
    BadPathByte(u8),
}

/// Identifies a backend on the wire and in reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolverKind {
    Sequential,
    Threaded,
    Cluster,
    Hybrid,
}

impl SolverKind {
    pub const ALL: [SolverKind; 4] = [
        SolverKind::Sequential,
        SolverKind::Threaded,
        SolverKind::Cluster,
        SolverKind::Hybrid,
    ];

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            SolverKind::Sequential => "sequential",
            SolverKind::Threaded => "threaded",
            SolverKind::Cluster => "cluster",
            SolverKind::Hybrid => "hybrid",
        }
    }

    /// Parse a wire id. The historical `openmp` and `mpi` ids of the
    /// service this one replaces are accepted as aliases.
    #[must_use]
    pub fn from_id(id: &str) -> Option<SolverKind> {
        match id {
            "sequential" => Some(SolverKind::Sequential),
            "threaded" | "openmp" => Some(SolverKind::Threaded),
            "cluster" | "mpi" => Some(SolverKind::Cluster),
            "hybrid" => Some(SolverKind::Hybrid),
            _ => None,
        }
    }
}

impl std::fmt::Display for SolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A fabric endpoint shared between the distributed solvers of one process.
pub type SharedFabric = Arc<Mutex<Fabric>>;

/// One configured backend. The four variants wrap the same kernel; this
/// enum is the only dispatch point.
pub enum Solver {
    Sequential(SequentialSolver),
    Threaded(ThreadedSolver),
    Cluster(ClusterSolver),
    Hybrid(HybridSolver),
}

impl Solver {
    #[must_use]
    pub fn kind(&self) -> SolverKind {
        match self {
            Solver::Sequential(_) => SolverKind::Sequential,
            Solver::Threaded(_) => SolverKind::Threaded,
            Solver::Cluster(_) => SolverKind::Cluster,
            Solver::Hybrid(_) => SolverKind::Hybrid,
        }
    }

    /// Search for a move sequence that solves `cube`. The input is not
    /// mutated; the returned path applied to it yields the solved state.
    pub fn solve(&self, cube: &Cube, options: &SolveOptions) -> Result<SolveReport, SolveError> {
        match self {
            Solver::Sequential(s) => Ok(s.solve(cube, options)),
            Solver::Threaded(s) => Ok(s.solve(cube, options)),
            Solver::Cluster(s) => s.solve(cube, options),
            Solver::Hybrid(s) => s.solve(cube, options),
        }
    }
}

/// Worker-peer main loop: block on the root's command broadcast and run the
/// selected protocol until told to shut down. A dropped root connection
/// ends the loop as well.
pub fn serve(mut fabric: Fabric, threads: usize) {
    info!(
        "worker peer {}/{} awaiting commands",
        fabric.rank(),
        fabric.size()
    );
    loop {
        let mut buf = [0u8; 8];
        if fabric.broadcast(0, &mut buf).is_err() {
            info!("command link closed; worker peer exiting");
            return;
        }
        let result = match i64::from_be_bytes(buf) {
            cluster::CMD_CLUSTER => cluster::participate(&mut fabric),
            cluster::CMD_HYBRID => hybrid::participate(&mut fabric, threads),
            _ => {
                info!("worker peer shutting down");
                return;
            }
        };
        if let Err(err) = result {
            warn!("worker peer abandoning fabric: {err}");
            return;
        }
    }
}

/// Ask every worker peer to exit its [`serve`] loop. Errors are ignored;
/// peers also exit when the fabric connection drops.
pub fn shutdown_peers(fabric: &SharedFabric) {
    let mut fabric = lock_fabric(fabric);
    let _ = cluster::send_command(&mut fabric, cluster::CMD_SHUTDOWN);
}

pub(crate) fn lock_fabric(fabric: &SharedFabric) -> std::sync::MutexGuard<'_, Fabric> {
    fabric
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
