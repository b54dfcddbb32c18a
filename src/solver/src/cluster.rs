//! The message-passing backend and its wire protocol, shared with the
//! hybrid driver.
//!
//! One solve is a command broadcast, a request broadcast (depth bound plus
//! the 54-byte state), then per τ-iteration: a τ broadcast from the root
//! (negative means stop), a local kernel pass over this rank's first-ply
//! slice, an all-reduce MIN over next bounds with −1 standing for "I
//! solved", and on success a MAX-rank election followed by the winner
//! broadcasting the path, one byte per move.

use std::time::Instant;

use cube::{Cube, Move};
use fabric::Fabric;
use itertools::Itertools;
use log::{debug, info};

use crate::kernel::{NO_BOUND, SharedSearch};
use crate::threaded::fan_out;
use crate::{
    ENGINE_BUDGET, SharedFabric, SolveError, SolveOptions, SolveReport, lock_fabric, start,
    success, working,
};

pub(crate) const CMD_SHUTDOWN: i64 = 0;
pub(crate) const CMD_CLUSTER: i64 = 1;
pub(crate) const CMD_HYBRID: i64 = 2;

/// All-reduce contribution meaning "this rank holds a solution".
const BOUND_SOLVED: i64 = -1;
/// Election contribution of a rank with nothing to publish.
const NO_RANK: i64 = -1;
/// τ broadcast values below zero end the solve on every rank.
const TAU_STOP: i64 = -1;

/// The inter-node backend: disjoint first-ply slices on every peer of the
/// fabric, single-threaded within a peer.
pub struct ClusterSolver {
    fabric: SharedFabric,
}

impl ClusterSolver {
    #[must_use]
    pub fn new(fabric: SharedFabric) -> ClusterSolver {
        ClusterSolver { fabric }
    }

    pub fn solve(&self, cube: &Cube, options: &SolveOptions) -> Result<SolveReport, SolveError> {
        if let Some(report) = solved_before_distribution(cube) {
            return Ok(report);
        }
        let mut fabric = lock_fabric(&self.fabric);
        send_command(&mut fabric, CMD_CLUSTER)?;
        let report = run(&mut fabric, 1, Some((cube, options)))?;
        Ok(report.expect("the root rank always produces a report"))
    }
}

/// The empty-path report for an input that needs no search. Checked before
/// any command broadcast so the peers are never engaged.
pub(crate) fn solved_before_distribution(cube: &Cube) -> Option<SolveReport> {
    cube.is_solved().then(|| SolveReport {
        solution: Some(Vec::new()),
        nodes: 0,
        elapsed: std::time::Duration::ZERO,
        timed_out: false,
    })
}

/// Worker-peer side of one cluster solve.
pub(crate) fn participate(fabric: &mut Fabric) -> Result<(), SolveError> {
    run(fabric, 1, None).map(|_| ())
}

/// Tell every worker peer which protocol to enter next.
pub(crate) fn send_command(fabric: &mut Fabric, command: i64) -> Result<(), SolveError> {
    let mut buf = command.to_be_bytes();
    fabric.broadcast(0, &mut buf)?;
    Ok(())
}

/// Drive one solve on this rank. The root passes the request and gets
/// `Some(report)`; worker peers pass `None`, learn the request from the
/// broadcast, and get `None` back once the root ends the solve.
///
/// `threads` is the intra-peer fan-out width: 1 for the cluster backend,
/// more for the hybrid backend. Worker threads are joined before any
/// collective call, so only this rank's driving thread touches the fabric.
pub(crate) fn run(
    fabric: &mut Fabric,
    threads: usize,
    request: Option<(&Cube, &SolveOptions)>,
) -> Result<Option<SolveReport>, SolveError> {
    let start = Instant::now();
    let is_root = fabric.is_root();
    debug_assert_eq!(is_root, request.is_some());

    let (cube, max_depth) = broadcast_request(fabric, request)?;
    let deadline = match request {
        Some((_, options)) => options.deadline_from(start),
        // Peers cannot see the root's clock; the engine-wide cap bounds
        // their kernels and the root's τ broadcast ends the solve.
        None => start + ENGINE_BUDGET,
    };

    let shared = SharedSearch::default();
    let mine: Vec<Move> = Move::QUARTER_TURNS
        .iter()
        .enumerate()
        .filter(|(index, _)| index % fabric.size() == fabric.rank())
        .map(|(_, &m)| m)
        .collect();

    if is_root {
        info!(
            start!("fanning out across {} peers ({} threads each)"),
            fabric.size(),
            threads
        );
    }

    let mut tau = i64::from(cube.heuristic());
    let mut timed_out = false;
    loop {
        // The root owns the bound schedule and the budget; peers follow
        // the broadcast.
        let mut buf = [0u8; 8];
        if is_root {
            let command = if Instant::now() >= deadline {
                timed_out = true;
                TAU_STOP
            } else if tau > i64::from(max_depth) {
                TAU_STOP
            } else {
                tau
            };
            buf = command.to_be_bytes();
        }
        fabric.broadcast(0, &mut buf)?;
        let bound = i64::from_be_bytes(buf);
        if bound < 0 {
            if is_root {
                info!("no solution within depth {max_depth}");
            }
            return Ok(root_report(is_root, &shared, start, None, timed_out));
        }

        debug!(working!("rank {} searching bound {}..."), fabric.rank(), bound);
        let fanned = fan_out(
            &cube,
            &mine,
            u32::try_from(bound).unwrap_or(u32::MAX),
            threads,
            &shared,
            deadline,
        );

        let local = match &fanned.solution {
            Some(_) => BOUND_SOLVED,
            None if fanned.next_bound == NO_BOUND => i64::from(u32::MAX),
            None => i64::from(fanned.next_bound),
        };
        let global = fabric.all_reduce_min(local)?;

        if global == BOUND_SOLVED {
            let claim = if fanned.solution.is_some() {
                i64::try_from(fabric.rank()).unwrap_or(NO_RANK)
            } else {
                NO_RANK
            };
            let winner = fabric.all_reduce_max(claim)?;
            let path = broadcast_path(
                fabric,
                usize::try_from(winner).unwrap_or(0),
                fanned.solution,
            )?;
            if is_root {
                info!(
                    success!("peer {} solved in {} moves ({}) after {:.3}s"),
                    winner,
                    path.len(),
                    path.iter().join(" "),
                    start.elapsed().as_secs_f64()
                );
            }
            return Ok(root_report(is_root, &shared, start, Some(path), false));
        }

        tau = global;
    }
}

/// Broadcast the depth bound and cube state from the root; every rank
/// returns the same request.
fn broadcast_request(
    fabric: &mut Fabric,
    request: Option<(&Cube, &SolveOptions)>,
) -> Result<(Cube, u32), SolveError> {
    let mut header = [0u8; 4 + 54];
    if let Some((cube, options)) = request {
        header[..4].copy_from_slice(&options.max_depth.to_be_bytes());
        header[4..].copy_from_slice(cube.serialize().as_bytes());
    }
    fabric.broadcast(0, &mut header)?;

    let max_depth = u32::from_be_bytes(header[..4].try_into().expect("slice is four bytes"));
    let state = std::str::from_utf8(&header[4..])
        .map_err(|_| corrupt_state())
        .and_then(|s| Cube::deserialize(s).map_err(|_| corrupt_state()))?;
    Ok((state, max_depth))
}

fn corrupt_state() -> SolveError {
    SolveError::Fabric(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "cube state broadcast was not a valid 54-symbol string",
    ))
}

/// The elected winner broadcasts its path length, then the moves as one
/// byte each; losers of the race discard their own results.
fn broadcast_path(
    fabric: &mut Fabric,
    winner: usize,
    local: Option<Vec<Move>>,
) -> Result<Vec<Move>, SolveError> {
    let owned = if fabric.rank() == winner {
        local.unwrap_or_default()
    } else {
        Vec::new()
    };

    let mut len_buf = [0u8; 4];
    if fabric.rank() == winner {
        len_buf = u32::try_from(owned.len()).unwrap_or(0).to_be_bytes();
    }
    fabric.broadcast(winner, &mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut bytes = vec![0u8; len];
    if fabric.rank() == winner {
        for (slot, m) in bytes.iter_mut().zip(&owned) {
            *slot = m.index();
        }
    }
    if len > 0 {
        fabric.broadcast(winner, &mut bytes)?;
    }

    bytes
        .into_iter()
        .map(|b| Move::from_index(b).ok_or(SolveError::BadPathByte(b)))
        .collect()
}

fn root_report(
    is_root: bool,
    shared: &SharedSearch,
    start: Instant,
    solution: Option<Vec<Move>>,
    timed_out: bool,
) -> Option<SolveReport> {
    is_root.then(|| SolveReport {
        solution,
        nodes: shared.nodes.load(std::sync::atomic::Ordering::Relaxed),
        elapsed: start.elapsed(),
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use fabric::FabricHost;

    use super::*;

    /// A three-rank fabric whose worker peers are threads in this process
    /// running the real serve loop.
    fn with_peers<T>(test: impl FnOnce(SharedFabric) -> T) -> T {
        let host = FabricHost::bind(3).unwrap();
        let addr = host.addr().unwrap();
        let workers: Vec<_> = (1..3)
            .map(|rank| {
                thread::spawn(move || {
                    crate::serve(Fabric::join(addr, rank, 3).unwrap(), 2);
                })
            })
            .collect();
        let fabric = Arc::new(Mutex::new(host.accept().unwrap()));

        let result = test(Arc::clone(&fabric));

        crate::shutdown_peers(&fabric);
        for worker in workers {
            worker.join().unwrap();
        }
        result
    }

    #[test]
    fn solves_across_peers() {
        with_peers(|fabric| {
            let mut cube = Cube::solved();
            cube.apply_all(&[Move::R, Move::U]);
            let report = ClusterSolver::new(fabric)
                .solve(&cube, &SolveOptions::default())
                .unwrap();
            let path = report.solution.expect("two-turn scramble is solvable");
            assert_eq!(path.len(), 2);
            let mut check = cube.clone();
            check.apply_all(&path);
            assert!(check.is_solved());
        });
    }

    #[test]
    fn already_solved_does_not_engage_peers() {
        with_peers(|fabric| {
            let report = ClusterSolver::new(fabric)
                .solve(&Cube::solved(), &SolveOptions::default())
                .unwrap();
            assert_eq!(report.solution, Some(Vec::new()));
            assert_eq!(report.nodes, 0);
        });
    }

    #[test]
    fn consecutive_solves_reuse_the_fabric() {
        with_peers(|fabric| {
            let solver = ClusterSolver::new(fabric);
            for scramble in [&[Move::U][..], &[Move::L, Move::D][..]] {
                let mut cube = Cube::solved();
                cube.apply_all(scramble);
                let report = solver.solve(&cube, &SolveOptions::default()).unwrap();
                assert_eq!(
                    report.solution.as_ref().map(Vec::len),
                    Some(scramble.len())
                );
            }
        });
    }

    #[test]
    fn depth_bound_exhaustion_reports_unsolved() {
        with_peers(|fabric| {
            let mut cube = Cube::solved();
            cube.apply_all(&[Move::R, Move::U, Move::RPrime, Move::UPrime]);
            let report = ClusterSolver::new(fabric)
                .solve(
                    &cube,
                    &SolveOptions {
                        max_depth: 3,
                        ..SolveOptions::default()
                    },
                )
                .unwrap();
            assert_eq!(report.solution, None);
            assert!(!report.timed_out);
        });
    }
}
