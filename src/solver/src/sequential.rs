use std::time::Instant;

use cube::Cube;
use itertools::Itertools;
use log::{debug, info};

use crate::kernel::{Kernel, NO_BOUND, Outcome, SharedSearch};
use crate::{SolveOptions, SolveReport, start, success, working};

/// The single-worker backend: plain iterative deepening around the kernel.
#[derive(Default)]
pub struct SequentialSolver;

impl SequentialSolver {
    #[must_use]
    pub fn new() -> SequentialSolver {
        SequentialSolver
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
        info!(start!("sequential search from bound {}"), tau);
        loop {
            if tau > options.max_depth {
                info!("no solution within depth {}", options.max_depth);
                return finish(&shared, start, None, false);
            }
            if Instant::now() >= deadline {
                return finish(&shared, start, None, true);
            }

            debug!(working!("searching bound {}..."), tau);
            let iteration = Instant::now();
            let mut kernel = Kernel::new(cube.clone(), &shared, deadline);
            let outcome = kernel.search(0, tau, None);
            debug!(
                working!("bound {} exhausted in {:.3}s"),
                tau,
                iteration.elapsed().as_secs_f64()
            );
            match outcome {
                Outcome::Solved => {
                    let path = kernel.into_path();
                    info!(
                        success!("solved in {} moves ({}) after {:.3}s"),
                        path.len(),
                        path.iter().join(" "),
                        start.elapsed().as_secs_f64()
                    );
                    return finish(&shared, start, Some(path), false);
                }
                Outcome::Next(NO_BOUND) => {
                    info!("search space exhausted without a solution");
                    return finish(&shared, start, None, false);
                }
                Outcome::Next(next) => tau = next,
                Outcome::Aborted => return finish(&shared, start, None, true),
            }
        }
    }
}

fn finish(
    shared: &SharedSearch,
    start: Instant,
    solution: Option<Vec<cube::Move>>,
    timed_out: bool,
) -> SolveReport {
    SolveReport {
        solution,
        nodes: shared.nodes.load(std::sync::atomic::Ordering::Relaxed),
        elapsed: start.elapsed(),
        timed_out,
    }
}
