//! The cost-limited DFS at the heart of every backend. Drivers differ only
//! in how they distribute first-ply branches and aggregate the results.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use cube::{Cube, Move};

/// Bound value meaning "no f-value above the threshold was seen anywhere
/// in this subtree", i.e. the subtree is exhausted.
pub(crate) const NO_BOUND: u32 = u32::MAX;

/// Result of searching one subtree under a threshold.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The goal test passed; the kernel's path stack is the solution.
    Solved,
    /// No solution within the threshold; carries the smallest f-value
    /// strictly above it, [`NO_BOUND`] if none.
    Next(u32),
    /// Cooperative cancellation: another worker won, or the clock ran out.
    /// Propagated outward without publishing anything.
    Aborted,
}

/// State shared by every worker of one solve.
#[derive(Default)]
pub(crate) struct SharedSearch {
    /// Set once by the winning worker; polled at every kernel node.
    pub found: AtomicBool,
    /// Total kernel nodes, incremented at every entry. Relaxed: the count
    /// is reporting-only and approximate under concurrency.
    pub nodes: AtomicU64,
}

/// A worker's in-place search state: one cube clone, one path stack.
pub(crate) struct Kernel<'a> {
    cube: Cube,
    path: Vec<Move>,
    shared: &'a SharedSearch,
    deadline: Instant,
    visited: u64,
}

impl<'a> Kernel<'a> {
    pub fn new(cube: Cube, shared: &'a SharedSearch, deadline: Instant) -> Kernel<'a> {
        Kernel {
            cube,
            path: Vec::new(),
            shared,
            deadline,
            visited: 0,
        }
    }

    /// A kernel rooted one ply down: `first` is applied to a clone of the
    /// root and seeds the path stack, the way fan-out drivers assign
    /// first-ply branches to workers.
    pub fn seeded(root: &Cube, first: Move, shared: &'a SharedSearch, deadline: Instant) -> Kernel<'a> {
        let mut cube = root.clone();
        cube.apply(first);
        Kernel {
            cube,
            path: vec![first],
            shared,
            deadline,
            visited: 0,
        }
    }

    /// The solution path after [`Outcome::Solved`].
    pub fn into_path(self) -> Vec<Move> {
        self.path
    }

    /// Depth-first search below the current node with accumulated cost `g`
    /// under threshold `bound`. `prev` is the move that produced this node,
    /// `None` at the root ply (which disables redundancy pruning).
    pub fn search(&mut self, g: u32, bound: u32, prev: Option<Move>) -> Outcome {
        self.shared.nodes.fetch_add(1, Ordering::Relaxed);
        self.visited += 1;
        if self.shared.found.load(Ordering::Acquire) {
            return Outcome::Aborted;
        }
        if self.visited & 1023 == 0 && Instant::now() >= self.deadline {
            return Outcome::Aborted;
        }

        let f = g + self.cube.heuristic();
        if f > bound {
            return Outcome::Next(f);
        }
        if self.cube.is_solved() {
            return Outcome::Solved;
        }

        let mut min = NO_BOUND;
        for m in Move::QUARTER_TURNS {
            if redundant(prev, m) {
                continue;
            }
            self.cube.apply(m);
            self.path.push(m);
            match self.search(g + 1, bound, Some(m)) {
                Outcome::Solved => return Outcome::Solved,
                Outcome::Next(t) => min = min.min(t),
                Outcome::Aborted => return Outcome::Aborted,
            }
            self.path.pop();
            self.cube.apply(m.inverse());
        }
        Outcome::Next(min)
    }
}

/// Branches provably not worth searching after `prev`:
///
/// - the same face again (two turns of one face collapse into one), and
/// - the opposite face out of canonical order. Opposite-face turns
///   commute, so of `U D` and `D U` only the ordering that lists the
///   lower-indexed face first is searched; the other composite is reached
///   through the canonical parent.
pub(crate) fn redundant(prev: Option<Move>, next: Move) -> bool {
    let Some(prev) = prev else {
        return false;
    };
    let (prev_face, next_face) = (prev.face(), next.face());
    prev_face == next_face
        || (prev_face.opposite() == next_face && prev_face as u8 > next_face as u8)
}
