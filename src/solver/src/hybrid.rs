use cube::Cube;
use fabric::Fabric;

use crate::cluster::{self, CMD_HYBRID, send_command, solved_before_distribution};
use crate::{SharedFabric, SolveError, SolveOptions, SolveReport, lock_fabric};

/// The two-level backend: the first ply is split across fabric peers like
/// the cluster driver, and each peer fans its slice out across threads
/// like the shared-memory driver. The intra-peer bound minimum feeds the
/// inter-peer all-reduce; the found flag stays peer-local and the
/// inter-peer status is consulted at each iteration boundary. Worker
/// threads are joined before the driving thread issues any collective, so
/// each peer speaks to the fabric from a single thread.
pub struct HybridSolver {
    fabric: SharedFabric,
    threads: usize,
}

impl HybridSolver {
    #[must_use]
    pub fn new(fabric: SharedFabric, threads: usize) -> HybridSolver {
        HybridSolver {
            fabric,
            threads: threads.max(1),
        }
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn solve(&self, cube: &Cube, options: &SolveOptions) -> Result<SolveReport, SolveError> {
        if let Some(report) = solved_before_distribution(cube) {
            return Ok(report);
        }
        let mut fabric = lock_fabric(&self.fabric);
        send_command(&mut fabric, CMD_HYBRID)?;
        let report = cluster::run(&mut fabric, self.threads, Some((cube, options)))?;
        Ok(report.expect("the root rank always produces a report"))
    }
}

/// Worker-peer side of one hybrid solve.
pub(crate) fn participate(fabric: &mut Fabric, threads: usize) -> Result<(), SolveError> {
    cluster::run(fabric, threads.max(1), None).map(|_| ())
}
