use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use cube::{Cube, Move};
use itertools::Itertools;
use log::{debug, info};

use crate::kernel::{Kernel, NO_BOUND, Outcome, SharedSearch};
use crate::{SolveOptions, SolveReport, start, success, working};

/// The shared-memory backend: each τ-iteration fans the twelve first-ply
/// branches out across OS threads, joins them, and aggregates the next
/// bound. Worker `i` owns the branches whose index is `i` modulo the
/// thread count.
pub struct ThreadedSolver {
    threads: usize,
}

impl ThreadedSolver {
    #[must_use]
    pub fn new(threads: usize) -> ThreadedSolver {
        ThreadedSolver {
            threads: threads.max(1),
        }
    }

    /// One worker per available core.
    #[must_use]
    pub fn with_available_parallelism() -> ThreadedSolver {
        ThreadedSolver::new(thread::available_parallelism().map_or(1, |n| n.get()))
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    #[must_use]
    pub fn solve(&self, cube: &Cube, options: &SolveOptions) -> SolveReport {
        let start = Instant::now();
        let shared = SharedSearch::default();
        let deadline = options.deadline_from(start);

        if cube.is_solved() {
            return finish(&shared, start, Some(Vec::new()), false);
        }

        let mut tau = cube.heuristic();
        info!(
            start!("fanning out across {} threads from bound {}"),
            self.threads, tau
        );
        loop {
            if tau > options.max_depth {
                info!("no solution within depth {}", options.max_depth);
                return finish(&shared, start, None, false);
            }
            if Instant::now() >= deadline {
                return finish(&shared, start, None, true);
            }

            debug!(working!("searching bound {}..."), tau);
            let fanned = fan_out(
                cube,
                &Move::QUARTER_TURNS,
                tau,
                self.threads,
                &shared,
                deadline,
            );
            if let Some(path) = fanned.solution {
                info!(
                    success!("solved in {} moves ({}) after {:.3}s"),
                    path.len(),
                    path.iter().join(" "),
                    start.elapsed().as_secs_f64()
                );
                return finish(&shared, start, Some(path), false);
            }
            if fanned.aborted {
                return finish(&shared, start, None, true);
            }
            if fanned.next_bound == NO_BOUND {
                info!("search space exhausted without a solution");
                return finish(&shared, start, None, false);
            }
            tau = fanned.next_bound;
        }
    }
}

/// The joined result of one τ-iteration's fan-out.
pub(crate) struct FanOut {
    pub solution: Option<Vec<Move>>,
    /// Minimum over the workers' next-threshold bounds.
    pub next_bound: u32,
    /// A worker hit the wall-clock deadline.
    pub aborted: bool,
}

/// Explore every branch in `first_ply` under threshold `tau`, splitting
/// them across `threads` workers. The winning worker elects itself with a
/// compare-exchange on the shared found flag and writes the solution
/// buffer exactly once; everyone else backs off at the next kernel node.
pub(crate) fn fan_out(
    root: &Cube,
    first_ply: &[Move],
    tau: u32,
    threads: usize,
    shared: &SharedSearch,
    deadline: Instant,
) -> FanOut {
    let best: Mutex<Option<Vec<Move>>> = Mutex::new(None);
    let next_bound = AtomicU32::new(NO_BOUND);
    let aborted = AtomicBool::new(false);
    let workers = threads.clamp(1, first_ply.len().max(1));

    thread::scope(|scope| {
        for worker in 0..workers {
            let best = &best;
            let next_bound = &next_bound;
            let aborted = &aborted;
            scope.spawn(move || {
                for (index, &first) in first_ply.iter().enumerate() {
                    if index % workers != worker {
                        continue;
                    }
                    if shared.found.load(Ordering::Acquire) {
                        return;
                    }
                    let mut kernel = Kernel::seeded(root, first, shared, deadline);
                    match kernel.search(1, tau, Some(first)) {
                        Outcome::Solved => {
                            if shared
                                .found
                                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                                .is_ok()
                            {
                                let mut slot =
                                    best.lock().unwrap_or_else(PoisonError::into_inner);
                                *slot = Some(kernel.into_path());
                            }
                            return;
                        }
                        Outcome::Next(bound) => {
                            next_bound.fetch_min(bound, Ordering::AcqRel);
                        }
                        Outcome::Aborted => {
                            aborted.store(true, Ordering::Release);
                            return;
                        }
                    }
                }
            });
        }
    });

    FanOut {
        solution: best.into_inner().unwrap_or_else(PoisonError::into_inner),
        next_bound: next_bound.load(Ordering::Acquire),
        aborted: aborted.load(Ordering::Acquire),
    }
}

fn finish(
    shared: &SharedSearch,
    start: Instant,
    solution: Option<Vec<Move>>,
    timed_out: bool,
) -> SolveReport {
    SolveReport {
        solution,
        nodes: shared.nodes.load(Ordering::Relaxed),
        elapsed: start.elapsed(),
        timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrambled(moves: &[Move]) -> Cube {
        let mut cube = Cube::solved();
        cube.apply_all(moves);
        cube
    }

    #[test]
    fn already_solved_is_the_empty_path() {
        let report =
            ThreadedSolver::new(4).solve(&Cube::solved(), &SolveOptions::default());
        assert_eq!(report.solution, Some(Vec::new()));
    }

    #[test]
    fn single_turn_is_inverted_exactly() {
        let cube = scrambled(&[Move::F]);
        let report = ThreadedSolver::new(4).solve(&cube, &SolveOptions::default());
        assert_eq!(report.solution, Some(vec![Move::FPrime]));
    }

    #[test]
    fn thread_counts_agree_on_solution_length() {
        let cube = scrambled(&[Move::R, Move::U, Move::FPrime]);
        let mut lengths = Vec::new();
        for threads in [1, 2, 4, 8] {
            let report = ThreadedSolver::new(threads).solve(&cube, &SolveOptions::default());
            let path = report.solution.expect("three-turn scramble is solvable");
            let mut check = cube.clone();
            check.apply_all(&path);
            assert!(check.is_solved(), "path from {threads} threads must solve");
            lengths.push(path.len());
        }
        assert!(lengths.iter().all_equal(), "lengths varied: {lengths:?}");
    }

    #[test]
    fn agrees_with_sequential_driver() {
        let cube = scrambled(&[Move::R, Move::U, Move::RPrime, Move::UPrime]);
        let sequential = crate::SequentialSolver::new()
            .solve(&cube, &SolveOptions::default())
            .solution
            .expect("solvable");
        let threaded = ThreadedSolver::new(4)
            .solve(&cube, &SolveOptions::default())
            .solution
            .expect("solvable");
        assert_eq!(sequential.len(), threaded.len());
    }
}
